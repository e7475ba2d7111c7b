//! Logical message model carried inside frames.

use bytes::Bytes;

/// Method name of the request that invokes a locally registered tool.
pub const TOOL_INVOKE: &str = "tool-invoke";
/// Method name of the request that asks the host to allocate a tool id.
pub const TOOL_CREATE: &str = "tool-create";

/// Response code: success.
pub const OK: i32 = 0;
/// Response code: admission rejected, too many requests in flight.
pub const TOO_MANY_REQUESTS: i32 = -32000;
/// Response code: the agent is shutting down and no longer dispatches requests.
pub const SHUTTING_DOWN: i32 = -32001;
/// Response code: no handler for the method (or no tool for the id).
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Response code: request parameters could not be decoded.
pub const INVALID_PARAMS: i32 = -32602;
/// Response code: the handler or tool failed.
pub const INTERNAL_ERROR: i32 = -32603;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Request(Request),
    Response(Response),
    Signal(Signal),
}

impl Envelope {
    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Request(_) => "request",
            Envelope::Response(_) => "response",
            Envelope::Signal(_) => "signal",
        }
    }

    /// Correlation id, if the message carries one.
    pub fn id(&self) -> Option<u64> {
        match self {
            Envelope::Request(req) => Some(req.id),
            Envelope::Response(resp) => Some(resp.id),
            Envelope::Signal(_) => None,
        }
    }
}

/// An RPC call, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Bytes,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: impl Into<Bytes>) -> Self {
        Self {
            id,
            method: method.into(),
            params: params.into(),
        }
    }

    /// Whether this request targets the tool registry rather than a named handler.
    pub fn is_tool_invocation(&self) -> bool {
        self.method == TOOL_INVOKE
    }
}

/// The answer to a [`Request`] with the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: u64,
    /// `0` on success, one of the negative error codes otherwise.
    pub code: i32,
    pub message: Option<String>,
    pub payload: Option<Bytes>,
}

impl Response {
    /// A successful response carrying `payload`.
    pub fn success(id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            code: OK,
            message: None,
            payload: Some(payload.into()),
        }
    }

    /// An error response built from `err`.
    pub fn error(id: u64, err: &RpcError) -> Self {
        Self {
            id,
            code: err.code,
            message: Some(err.message.clone()),
            payload: err.data.clone(),
        }
    }

    /// Build the response for a handler or tool outcome.
    pub fn from_result(id: u64, result: RpcResult) -> Self {
        match result {
            Ok(payload) => Self::success(id, payload),
            Err(err) => Self::error(id, &err),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == OK
    }

    /// Convert into the tagged result form. A success without payload yields
    /// an empty buffer.
    pub fn into_result(self) -> RpcResult {
        if self.code == OK {
            return Ok(self.payload.unwrap_or_default());
        }
        Err(RpcError {
            code: self.code,
            message: self.message.unwrap_or_default(),
            data: self.payload,
        })
    }
}

/// Out-of-band control signal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The host asks the agent to drain and exit.
    Terminate,
}

impl SignalKind {
    /// Numeric wire value used by binary encodings.
    pub fn code(self) -> u16 {
        match self {
            SignalKind::Terminate => 1,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(SignalKind::Terminate),
            _ => None,
        }
    }

    /// Name used by textual encodings.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Terminate => "terminate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "terminate" => Some(SignalKind::Terminate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
}

impl Signal {
    pub fn terminate() -> Self {
        Self {
            kind: SignalKind::Terminate,
        }
    }
}

/// Error half of [`RpcResult`]: a response code, a description and optional data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("code {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Bytes>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a data payload.
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::new(INTERNAL_ERROR, message.to_string())
    }

    pub fn invalid_params(message: impl std::fmt::Display) -> Self {
        Self::new(INVALID_PARAMS, message.to_string())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn too_many_requests() -> Self {
        Self::new(TOO_MANY_REQUESTS, "too many requests")
    }

    pub fn shutting_down() -> Self {
        Self::new(SHUTTING_DOWN, "agent is shutting down")
    }
}

/// Outcome of a handler, a tool, or a remote call.
pub type RpcResult = Result<Bytes, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response_into_result() {
        let resp = Response::success(3, Bytes::from_static(b"ok"));
        assert!(resp.is_success());
        assert_eq!(resp.into_result().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn success_without_payload_is_empty() {
        let resp = Response {
            id: 1,
            code: OK,
            message: None,
            payload: None,
        };
        assert!(resp.into_result().unwrap().is_empty());
    }

    #[test]
    fn error_response_roundtrips_rpc_error() {
        let err = RpcError::internal("boom").with_data(Bytes::from_static(b"trace"));
        let resp = Response::error(9, &err);

        assert_eq!(resp.id, 9);
        assert_eq!(resp.code, INTERNAL_ERROR);
        assert!(!resp.is_success());
        assert_eq!(resp.into_result().unwrap_err(), err);
    }

    #[test]
    fn from_result_picks_variant() {
        let ok = Response::from_result(1, Ok(Bytes::from_static(b"x")));
        assert_eq!(ok.code, OK);

        let err = Response::from_result(2, Err(RpcError::too_many_requests()));
        assert_eq!(err.code, TOO_MANY_REQUESTS);
        assert_eq!(err.message.as_deref(), Some("too many requests"));
    }

    #[test]
    fn signal_kind_wire_values() {
        assert_eq!(SignalKind::from_code(SignalKind::Terminate.code()), Some(SignalKind::Terminate));
        assert_eq!(SignalKind::from_name("terminate"), Some(SignalKind::Terminate));
        assert_eq!(SignalKind::from_code(0), None);
        assert_eq!(SignalKind::from_name("reboot"), None);
    }

    #[test]
    fn envelope_accessors() {
        let req = Envelope::Request(Request::new(5, TOOL_INVOKE, Bytes::new()));
        assert_eq!(req.kind(), "request");
        assert_eq!(req.id(), Some(5));

        let sig = Envelope::Signal(Signal::terminate());
        assert_eq!(sig.kind(), "signal");
        assert_eq!(sig.id(), None);

        if let Envelope::Request(req) = req {
            assert!(req.is_tool_invocation());
        }
    }

    #[test]
    fn rpc_error_display() {
        let err = RpcError::method_not_found("frobnicate");
        assert_eq!(err.to_string(), "code -32601: method not found: frobnicate");
    }
}
