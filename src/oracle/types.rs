//! Chat-completions wire types and the `updatePageHidden` function schema.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Name of the only function the model may call.
pub const UPDATE_PAGE_HIDDEN: &str = "updatePageHidden";

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Tool>,
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, as text.
    pub arguments: String,
}

// ============================================================
// updatePageHidden
// ============================================================

/// Arguments of `updatePageHidden`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdatePageHidden {
    /// The page for which to update the hidden property.
    pub page: String,
    /// The dynamic expression to set as hidden property.
    #[serde(deserialize_with = "string_or_json")]
    pub expression: String,
}

/// Models sometimes inline the expression as JSON instead of a string;
/// both are accepted and normalised to text.
fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// The function declaration sent with every request.
pub fn update_page_hidden_tool() -> Tool {
    let mut parameters = serde_json::to_value(schemars::schema_for!(UpdatePageHidden))
        .unwrap_or_else(|_| Value::Object(Default::default()));
    if let Some(object) = parameters.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }

    Tool {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: UPDATE_PAGE_HIDDEN.to_string(),
            description: "Update the hidden property on a specific page given the page name \
                          and the expression to put in the hidden property."
                .to_string(),
            parameters,
        },
    }
}
