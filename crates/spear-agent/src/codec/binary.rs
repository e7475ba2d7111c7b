//! Compact binary encoding built on [`postcard`].
//!
//! Envelopes and tool messages are mapped onto private wire enums and
//! serialized with postcard: varint integers, varint-length strings and byte
//! fields, and a varint variant index in front of every message.
//!
//! ```text
//! request:  [0][id][method][params]
//! response: [1][id][code][message?][payload?]
//! signal:   [2][kind]
//! ```

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::{CodecError, Result, WireCodec};
use crate::envelope::{Envelope, Request, Response, Signal, SignalKind};
use crate::tool::{ToolMessage, ToolParamSpec, ToolParams, ToolSpec};

/// Postcard-based binary codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

#[derive(Debug, Serialize, Deserialize)]
enum WireEnvelope<'a> {
    Request {
        id: u64,
        method: Cow<'a, str>,
        params: Cow<'a, [u8]>,
    },
    Response {
        id: u64,
        code: i32,
        message: Option<Cow<'a, str>>,
        payload: Option<Cow<'a, [u8]>>,
    },
    Signal {
        kind: u16,
    },
}

#[derive(Debug, Serialize, Deserialize)]
enum WireTool<'a> {
    Invoke {
        tool_id: u64,
        params: Cow<'a, ToolParams>,
    },
    Output {
        result: Cow<'a, str>,
    },
    Create {
        name: Cow<'a, str>,
        description: Cow<'a, str>,
        params: Vec<WireParam<'a>>,
    },
    Created {
        tool_id: u64,
    },
}

/// Field-for-field copy of [`ToolParamSpec`]. Postcard is not
/// self-describing, so optional fields cannot be skipped.
#[derive(Debug, Serialize, Deserialize)]
struct WireParam<'a> {
    name: Cow<'a, str>,
    param_type: Cow<'a, str>,
    description: Option<Cow<'a, str>>,
    required: bool,
}

/// Deserialize a complete message; leftover bytes are an error.
fn from_wire<'de, T: Deserialize<'de>>(payload: &'de [u8]) -> Result<T> {
    let (value, rest) = postcard::take_from_bytes(payload)?;
    if !rest.is_empty() {
        return Err(CodecError::TrailingBytes(rest.len()));
    }
    Ok(value)
}

impl WireCodec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let wire = match envelope {
            Envelope::Request(req) => WireEnvelope::Request {
                id: req.id,
                method: Cow::Borrowed(&req.method),
                params: Cow::Borrowed(&req.params),
            },
            Envelope::Response(resp) => WireEnvelope::Response {
                id: resp.id,
                code: resp.code,
                message: resp.message.as_deref().map(Cow::Borrowed),
                payload: resp.payload.as_deref().map(Cow::Borrowed),
            },
            Envelope::Signal(sig) => WireEnvelope::Signal {
                kind: sig.kind.code(),
            },
        };
        Ok(postcard::to_allocvec(&wire)?)
    }

    fn decode(&self, payload: &[u8]) -> Result<Envelope> {
        let envelope = match from_wire::<WireEnvelope<'_>>(payload)? {
            WireEnvelope::Request { id, method, params } => Envelope::Request(Request {
                id,
                method: method.into_owned(),
                params: params.into_owned().into(),
            }),
            WireEnvelope::Response {
                id,
                code,
                message,
                payload,
            } => Envelope::Response(Response {
                id,
                code,
                message: message.map(Cow::into_owned),
                payload: payload.map(|p| p.into_owned().into()),
            }),
            WireEnvelope::Signal { kind } => {
                let kind = SignalKind::from_code(kind)
                    .ok_or_else(|| CodecError::UnknownKind(format!("signal {kind}")))?;
                Envelope::Signal(Signal { kind })
            }
        };
        Ok(envelope)
    }

    fn encode_tool(&self, message: &ToolMessage) -> Result<Vec<u8>> {
        let wire = match message {
            ToolMessage::Invoke { tool_id, params } => WireTool::Invoke {
                tool_id: *tool_id,
                params: Cow::Borrowed(params),
            },
            ToolMessage::Output { result } => WireTool::Output {
                result: Cow::Borrowed(result),
            },
            ToolMessage::Create(spec) => WireTool::Create {
                name: Cow::Borrowed(&spec.name),
                description: Cow::Borrowed(&spec.description),
                params: spec
                    .params
                    .iter()
                    .map(|param| WireParam {
                        name: Cow::Borrowed(&param.name),
                        param_type: Cow::Borrowed(&param.param_type),
                        description: param.description.as_deref().map(Cow::Borrowed),
                        required: param.required,
                    })
                    .collect(),
            },
            ToolMessage::Created { tool_id } => WireTool::Created { tool_id: *tool_id },
        };
        Ok(postcard::to_allocvec(&wire)?)
    }

    fn decode_tool(&self, payload: &[u8]) -> Result<ToolMessage> {
        let message = match from_wire::<WireTool<'_>>(payload)? {
            WireTool::Invoke { tool_id, params } => ToolMessage::Invoke {
                tool_id,
                params: params.into_owned(),
            },
            WireTool::Output { result } => ToolMessage::Output {
                result: result.into_owned(),
            },
            WireTool::Create {
                name,
                description,
                params,
            } => ToolMessage::Create(ToolSpec {
                name: name.into_owned(),
                description: description.into_owned(),
                params: params
                    .into_iter()
                    .map(|param| ToolParamSpec {
                        name: param.name.into_owned(),
                        param_type: param.param_type.into_owned(),
                        description: param.description.map(Cow::into_owned),
                        required: param.required,
                    })
                    .collect(),
            }),
            WireTool::Created { tool_id } => ToolMessage::Created { tool_id },
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::envelope::RpcError;

    #[test]
    fn request_layout() {
        let wire = BinaryCodec
            .encode(&Envelope::Request(Request::new(
                0x0102,
                "ab",
                Bytes::from_static(b"xyz"),
            )))
            .unwrap();

        // variant 0, varint id, then length-prefixed method and params
        assert_eq!(wire, vec![0, 0x82, 0x02, 2, b'a', b'b', 3, b'x', b'y', b'z']);
    }

    #[test]
    fn signal_layout() {
        let wire = BinaryCodec
            .encode(&Envelope::Signal(Signal::terminate()))
            .unwrap();
        assert_eq!(wire, vec![2, 1]);
    }

    #[test]
    fn response_optional_fields() {
        let bare = Response {
            id: 1,
            code: 0,
            message: None,
            payload: None,
        };
        let wire = BinaryCodec.encode(&Envelope::Response(bare.clone())).unwrap();
        assert_eq!(wire, vec![1, 1, 0, 0, 0]);
        assert_eq!(BinaryCodec.decode(&wire).unwrap(), Envelope::Response(bare));

        let err = Response::error(2, &RpcError::too_many_requests());
        let wire = BinaryCodec.encode(&Envelope::Response(err.clone())).unwrap();
        assert_eq!(BinaryCodec.decode(&wire).unwrap(), Envelope::Response(err));
    }

    #[test]
    fn arbitrary_bytes_are_carried() {
        let req = Request::new(5, "blob", Bytes::from_static(b"\x00\xff\xfe"));
        let wire = BinaryCodec.encode(&Envelope::Request(req.clone())).unwrap();
        assert_eq!(BinaryCodec.decode(&wire).unwrap(), Envelope::Request(req));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let wire = BinaryCodec
            .encode(&Envelope::Request(Request::new(1, "echo", Bytes::new())))
            .unwrap();
        assert!(matches!(
            BinaryCodec.decode(&wire[..wire.len() - 2]).unwrap_err(),
            CodecError::Binary(_)
        ));
        assert!(matches!(
            BinaryCodec.decode(&[]).unwrap_err(),
            CodecError::Binary(_)
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut wire = BinaryCodec
            .encode(&Envelope::Signal(Signal::terminate()))
            .unwrap();
        wire.push(0);
        assert!(matches!(
            BinaryCodec.decode(&wire).unwrap_err(),
            CodecError::TrailingBytes(1)
        ));
    }

    #[test]
    fn unknown_variants_are_rejected() {
        assert!(matches!(
            BinaryCodec.decode(&[9]).unwrap_err(),
            CodecError::Binary(_)
        ));
        assert!(matches!(
            BinaryCodec.decode(&[2, 7]).unwrap_err(),
            CodecError::UnknownKind(_)
        ));
        assert!(matches!(
            BinaryCodec.decode_tool(&[9]).unwrap_err(),
            CodecError::Binary(_)
        ));
    }

    #[test]
    fn invalid_utf8_method_is_rejected() {
        let wire = [0, 1, 1, 0xff, 0];
        assert!(matches!(
            BinaryCodec.decode(&wire).unwrap_err(),
            CodecError::Binary(_)
        ));
    }

    #[test]
    fn created_tool_layout() {
        let wire = BinaryCodec
            .encode_tool(&ToolMessage::Created { tool_id: 12 })
            .unwrap();
        assert_eq!(wire, vec![3, 12]);
    }

    #[test]
    fn create_keeps_absent_param_descriptions() {
        let mut spec = ToolSpec::new("lookup", "find things").param("query", "what", true);
        spec.params.push(ToolParamSpec {
            name: "limit".to_string(),
            param_type: "string".to_string(),
            description: None,
            required: false,
        });
        let message = ToolMessage::Create(spec);

        let wire = BinaryCodec.encode_tool(&message).unwrap();
        assert_eq!(BinaryCodec.decode_tool(&wire).unwrap(), message);
    }
}
