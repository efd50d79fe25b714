use serde::{Deserialize, Serialize};

// ─── Content ──────────────────────────────────────────────────────────────────

/// A single content item inside a message.
///
/// Only text exists today; the tagged representation leaves room for richer
/// variants without breaking stored data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
}

impl Content {
    /// Convenience constructor for a plain text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }
}

/// Join the text of a content list with newlines.
pub fn join_contents(contents: &[Content]) -> String {
    contents
        .iter()
        .map(Content::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Messages ─────────────────────────────────────────────────────────────────

/// One entry in the conversation history, tagged by role.
///
/// System prompts are never stored in history; they travel as a separate
/// argument to [`crate::LlmClient::generate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        contents: Vec<Content>,
    },
    Model {
        contents: Vec<Content>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
        name: String,
        result: ToolResult,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            contents: vec![Content::text(text)],
        }
    }

    pub fn user_with_contents(contents: Vec<Content>) -> Self {
        Self::User { contents }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::Model {
            contents: vec![Content::text(text)],
            tool_calls: Vec::new(),
        }
    }

    pub fn tool(result: ToolResult, name: impl Into<String>, call_id: Option<String>) -> Self {
        Self::Tool {
            call_id,
            name: name.into(),
            result,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// Plain-text rendering of this message's content.  Tool calls and tool
    /// results serialise to JSON so nothing is invisible to token counting
    /// or summarisation.
    pub fn render_text(&self) -> String {
        match self {
            Self::User { contents } => join_contents(contents),
            Self::Model {
                contents,
                tool_calls,
            } => {
                let mut text = join_contents(contents);
                for call in tool_calls {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&format!(
                        "{}({})",
                        call.name,
                        serde_json::to_string(&call.args).unwrap_or_default()
                    ));
                }
                text
            }
            Self::Tool { name, result, .. } => format!(
                "{name} -> {}",
                serde_json::to_string(result).unwrap_or_default()
            ),
        }
    }

    /// Approximate character weight used by the token estimator.
    pub fn approx_chars(&self) -> usize {
        self.render_text().len()
    }
}

// ─── Tool calls and results ──────────────────────────────────────────────────

/// A single tool invocation requested by the model.  `id` is unique within
/// one model turn and is echoed back on the answering tool message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON argument object conforming to the named tool's schema.
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// View the arguments as an object map.  Non-object arguments (which a
    /// conforming model never sends) read as an empty map.
    pub fn args_object(&self) -> serde_json::Map<String, serde_json::Value> {
        self.args.as_object().cloned().unwrap_or_default()
    }
}

/// Outcome of a tool execution.
///
/// The constructors keep `success ⇔ content present ⇔ no error`.  The one
/// sanctioned exception is [`ToolResult::redacted`]: the structured-reply
/// interception appends a successful result whose content has been dropped
/// so history does not repeat the user-visible payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }

    /// Drop the content, keeping the success flag.
    pub fn redacted(mut self) -> Self {
        self.content = None;
        self
    }
}

// ─── LLM exchange types ───────────────────────────────────────────────────────

/// A tool schema as presented to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// One model turn as returned by an [`crate::LlmClient`].
///
/// `total_tokens` is the adapter-reported running cumulative token count for
/// the conversation; the context manager uses it to drive summarisation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub contents: Vec<Content>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
    pub total_tokens: u64,
}

impl LlmResponse {
    /// Materialise the model message for appending to history.
    pub fn to_message(&self) -> Message {
        Message::Model {
            contents: self.contents.clone(),
            tool_calls: self.tool_calls.clone(),
        }
    }
}

// ─── Actor identity ──────────────────────────────────────────────────────────

/// Identity of one actor instance.  All runs for an identity are serialised
/// by its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId {
    pub user_id: i64,
    pub actor_id: i64,
}

impl ActorId {
    pub fn new(user_id: i64, actor_id: i64) -> Self {
        Self { user_id, actor_id }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
