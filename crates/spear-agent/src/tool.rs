//! Tool callbacks and the sub-messages that carry them.
//!
//! A tool is a local callback addressed by an integer id instead of a method
//! name. The host invokes it with a [`TOOL_INVOKE`](crate::envelope::TOOL_INVOKE)
//! request whose params hold a [`ToolMessage::Invoke`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::envelope::RpcError;

pub type ToolId = u64;

/// String parameters passed to a tool, keyed by parameter name.
pub type ToolParams = BTreeMap<String, String>;

/// A locally implemented tool.
pub trait Tool: Send + Sync + 'static {
    fn invoke(&self, params: &ToolParams) -> Result<String, RpcError>;
}

impl<F> Tool for F
where
    F: Fn(&ToolParams) -> Result<String, RpcError> + Send + Sync + 'static,
{
    fn invoke(&self, params: &ToolParams) -> Result<String, RpcError> {
        self(params)
    }
}

/// Description of one tool parameter, announced to the host on creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub required: bool,
}

/// Description of a tool, announced to the host on creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ToolParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a string parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.params.push(ToolParamSpec {
            name: name.into(),
            param_type: "string".to_string(),
            description: Some(description.into()),
            required,
        });
        self
    }
}

/// Tool sub-messages nested inside request params or response payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolMessage {
    /// Host → agent: run tool `tool_id` with `params`.
    Invoke { tool_id: ToolId, params: ToolParams },
    /// Agent → host: the tool's output.
    Output { result: String },
    /// Agent → host: allocate an id for this tool.
    Create(ToolSpec),
    /// Host → agent: the id allocated for a created tool.
    Created { tool_id: ToolId },
}

impl ToolMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolMessage::Invoke { .. } => "invoke",
            ToolMessage::Output { .. } => "output",
            ToolMessage::Create(_) => "create",
            ToolMessage::Created { .. } => "created",
        }
    }
}
