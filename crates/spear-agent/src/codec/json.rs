//! JSON-RPC 2.0 shaped encoding.
//!
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"echo","params":{...}}
//! {"jsonrpc":"2.0","id":1,"result":{...}}
//! {"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"...","data":...}}
//! {"jsonrpc":"2.0","signal":"terminate"}
//! ```
//!
//! Params, results and error data are embedded as JSON values, so byte
//! payloads handed to this codec must themselves be JSON text (or empty).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CodecError, Result, WireCodec};
use crate::envelope::{Envelope, Request, Response, Signal, SignalKind, OK};
use crate::tool::ToolMessage;

const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 shaped codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMessage {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signal: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireError {
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn to_value(payload: &[u8]) -> Result<Option<Value>> {
    if payload.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(payload)
        .map(Some)
        .map_err(|_| CodecError::NotJson(payload.len()))
}

fn from_value(value: Option<Value>) -> Result<Bytes> {
    match value {
        None | Some(Value::Null) => Ok(Bytes::new()),
        Some(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
    }
}

impl WireCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let mut wire = WireMessage {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            ..WireMessage::default()
        };

        match envelope {
            Envelope::Request(req) => {
                wire.id = Some(req.id);
                wire.method = Some(req.method.clone());
                wire.params = to_value(&req.params)?;
            }
            Envelope::Response(resp) => {
                wire.id = Some(resp.id);
                let payload = resp.payload.as_deref().unwrap_or_default();
                if resp.code == OK {
                    wire.result = Some(to_value(payload)?.unwrap_or(Value::Null));
                } else {
                    wire.error = Some(WireError {
                        code: resp.code,
                        message: resp.message.clone().unwrap_or_default(),
                        data: to_value(payload)?,
                    });
                }
            }
            Envelope::Signal(sig) => {
                wire.signal = Some(sig.kind.as_str().to_string());
            }
        }

        Ok(serde_json::to_vec(&wire)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Envelope> {
        let wire: WireMessage = serde_json::from_slice(payload)?;

        if let Some(version) = wire.jsonrpc.as_deref() {
            if version != JSONRPC_VERSION {
                return Err(CodecError::Malformed(format!(
                    "unsupported jsonrpc version '{version}'"
                )));
            }
        }

        if let Some(name) = wire.signal {
            let kind = SignalKind::from_name(&name)
                .ok_or_else(|| CodecError::UnknownKind(format!("signal '{name}'")))?;
            return Ok(Envelope::Signal(Signal { kind }));
        }

        let id = wire
            .id
            .ok_or_else(|| CodecError::Malformed("message has no id".to_string()))?;

        if let Some(method) = wire.method {
            if wire.result.is_some() || wire.error.is_some() {
                return Err(CodecError::Malformed(
                    "request carries result or error".to_string(),
                ));
            }
            return Ok(Envelope::Request(Request {
                id,
                method,
                params: from_value(wire.params)?,
            }));
        }

        match (wire.result, wire.error) {
            (Some(_), Some(_)) => Err(CodecError::Malformed(
                "response carries both result and error".to_string(),
            )),
            (result, None) => Ok(Envelope::Response(Response::success(
                id,
                from_value(result)?,
            ))),
            (None, Some(err)) => {
                let data = match err.data {
                    None => None,
                    Some(value) => Some(from_value(Some(value))?),
                };
                Ok(Envelope::Response(Response {
                    id,
                    code: err.code,
                    message: Some(err.message),
                    payload: data,
                }))
            }
        }
    }

    fn encode_tool(&self, message: &ToolMessage) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode_tool(&self, payload: &[u8]) -> Result<ToolMessage> {
        Ok(serde_json::from_slice(payload)?)
    }
}
