//! Response-producing actions and their payloads.
//!
//! Payloads stay close to the platform's wire shape (`content`, `embeds`,
//! `components`, `flags`, ...) so a recorded action can be persisted and
//! replayed without knowing the transport.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A reply body: the string shorthand or a structured message object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyValue {
    Text(String),
    Message(Map<String, Value>),
}

impl ReplyValue {
    /// A structured message with only `content` set.
    pub fn content(content: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("content".into(), Value::String(content.into()));
        ReplyValue::Message(map)
    }

    /// A structured message only the invoking user can see.
    pub fn ephemeral(content: impl Into<String>) -> Self {
        ReplyValue::content(content).with_field("ephemeral", Value::Bool(true))
    }

    /// Convert an arbitrary JSON value. Objects stay structured, strings use
    /// the shorthand, anything else becomes the text of a message.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => ReplyValue::Message(map),
            Value::String(s) => ReplyValue::Text(s),
            other => ReplyValue::Text(other.to_string()),
        }
    }

    pub fn with_field(self, key: &str, value: Value) -> Self {
        let mut map = self.into_message();
        map.insert(key.to_string(), value);
        ReplyValue::Message(map)
    }

    /// The structured form; the shorthand becomes `{ "content": text }`.
    pub fn into_message(self) -> Map<String, Value> {
        match self {
            ReplyValue::Text(text) => {
                let mut map = Map::new();
                map.insert("content".into(), Value::String(text));
                map
            }
            ReplyValue::Message(map) => map,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        match self {
            ReplyValue::Text(_) => false,
            ReplyValue::Message(map) => map.get("ephemeral").and_then(Value::as_bool) == Some(true),
        }
    }
}

impl From<&str> for ReplyValue {
    fn from(s: &str) -> Self {
        ReplyValue::Text(s.to_string())
    }
}

impl From<String> for ReplyValue {
    fn from(s: String) -> Self {
        ReplyValue::Text(s)
    }
}

impl From<Map<String, Value>> for ReplyValue {
    fn from(map: Map<String, Value>) -> Self {
        ReplyValue::Message(map)
    }
}

/// Options for acknowledging an interaction now and answering later.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
}

impl DeferOptions {
    pub fn ephemeral() -> Self {
        Self {
            ephemeral: Some(true),
        }
    }
}

/// A modal in its normalized (serialized) form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModalPayload(pub Value);

impl ModalPayload {
    /// Normalize anything serializable into the payload that gets recorded.
    pub fn from_serializable<T: Serialize>(modal: &T) -> serde_json::Result<Self> {
        serde_json::to_value(modal).map(ModalPayload)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.0.get("custom_id").and_then(Value::as_str)
    }
}

impl From<Value> for ModalPayload {
    fn from(value: Value) -> Self {
        ModalPayload(value)
    }
}

impl From<Modal> for ModalPayload {
    fn from(modal: Modal) -> Self {
        ModalPayload(modal.to_api())
    }
}

/// Builder for a modal with text inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

impl Modal {
    pub fn new(custom_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            title: title.into(),
            inputs: Vec::new(),
        }
    }

    pub fn input(mut self, input: TextInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Wire shape: one action row (type 1) per text input (type 4).
    pub fn to_api(&self) -> Value {
        let rows: Vec<Value> = self
            .inputs
            .iter()
            .map(|input| {
                serde_json::json!({
                    "type": 1,
                    "components": [input.to_api()],
                })
            })
            .collect();
        serde_json::json!({
            "custom_id": self.custom_id,
            "title": self.title,
            "components": rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextInput {
    pub custom_id: String,
    pub label: String,
    /// 1 = single line, 2 = paragraph.
    pub style: u8,
    pub placeholder: Option<String>,
    pub required: bool,
}

impl TextInput {
    pub fn short(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style: 1,
            placeholder: None,
            required: true,
        }
    }

    pub fn paragraph(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            style: 2,
            ..Self::short(custom_id, label)
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn to_api(&self) -> Value {
        let mut value = serde_json::json!({
            "type": 4,
            "custom_id": self.custom_id,
            "label": self.label,
            "style": self.style,
            "required": self.required,
        });
        if let Some(placeholder) = &self.placeholder {
            value["placeholder"] = Value::String(placeholder.clone());
        }
        value
    }
}

/// One recorded call to a response-producing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Action {
    Reply(ReplyValue),
    DeferReply(DeferOptions),
    DeleteReply,
    EditReply(ReplyValue),
    FollowUp(ReplyValue),
    ShowModal(ModalPayload),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Reply(_) => ActionKind::Reply,
            Action::DeferReply(_) => ActionKind::DeferReply,
            Action::DeleteReply => ActionKind::DeleteReply,
            Action::EditReply(_) => ActionKind::EditReply,
            Action::FollowUp(_) => ActionKind::FollowUp,
            Action::ShowModal(_) => ActionKind::ShowModal,
        }
    }
}

/// The fixed set of operations a recorder intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Reply,
    DeferReply,
    DeleteReply,
    EditReply,
    FollowUp,
    ShowModal,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Reply,
        ActionKind::DeferReply,
        ActionKind::DeleteReply,
        ActionKind::EditReply,
        ActionKind::FollowUp,
        ActionKind::ShowModal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Reply => "reply",
            ActionKind::DeferReply => "deferReply",
            ActionKind::DeleteReply => "deleteReply",
            ActionKind::EditReply => "editReply",
            ActionKind::FollowUp => "followUp",
            ActionKind::ShowModal => "showModal",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_value_shorthand_serializes_as_string() {
        let json = serde_json::to_string(&ReplyValue::from("hi")).unwrap();
        assert_eq!(json, r#""hi""#);
    }

    #[test]
    fn ephemeral_helper_sets_flag() {
        let reply = ReplyValue::ephemeral("secret");
        assert!(reply.is_ephemeral());
        assert!(!ReplyValue::from("public").is_ephemeral());
    }

    #[test]
    fn action_wire_shape() {
        let json = serde_json::to_value(Action::DeferReply(DeferOptions::ephemeral())).unwrap();
        assert_eq!(json["kind"], "deferReply");
        assert_eq!(json["payload"]["ephemeral"], true);

        let delete = serde_json::to_value(Action::DeleteReply).unwrap();
        assert_eq!(delete["kind"], "deleteReply");
    }

    #[test]
    fn modal_builder_normalizes_to_action_rows() {
        let payload: ModalPayload = Modal::new("echo-modal", "Echo")
            .input(TextInput::short("echo", "Echo me").placeholder("I'll repeat it"))
            .into();
        let value = payload.as_value();
        assert_eq!(payload.custom_id(), Some("echo-modal"));
        assert_eq!(value["components"][0]["type"], 1);
        assert_eq!(value["components"][0]["components"][0]["type"], 4);
        assert_eq!(
            value["components"][0]["components"][0]["placeholder"],
            "I'll repeat it"
        );
    }

    #[test]
    fn from_json_keeps_objects_structured() {
        let reply = ReplyValue::from_json(serde_json::json!({"content": "x", "tts": true}));
        assert!(matches!(reply, ReplyValue::Message(_)));
        assert_eq!(ReplyValue::from_json(serde_json::json!(7)), ReplyValue::from("7"));
    }
}
