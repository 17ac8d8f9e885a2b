//! Canonical response and the reducer that produces it.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::action::{Action, ModalPayload, ReplyValue};

/// Serializes as the literal `true` and refuses anything else, so marker
/// objects never swallow a plain reply during untagged deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct True;

impl Serialize for True {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(true)
    }
}

impl<'de> Deserialize<'de> for True {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if bool::deserialize(deserializer)? {
            Ok(True)
        } else {
            Err(D::Error::custom("expected `true`"))
        }
    }
}

/// An acknowledged interaction whose answer has not been written yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeferredMarker {
    pub deferred: True,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
}

impl DeferredMarker {
    pub fn new(ephemeral: Option<bool>) -> Self {
        Self {
            deferred: True,
            ephemeral,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModalMarker {
    pub modal: True,
    pub data: ModalPayload,
}

impl ModalMarker {
    pub fn new(data: ModalPayload) -> Self {
        Self { modal: True, data }
    }
}

/// The single terminal answer of an interaction.
///
/// Variant order matters: markers are tried before the catch-all reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Terminal {
    Deferred(DeferredMarker),
    Modal(ModalMarker),
    Reply(ReplyValue),
}

/// Reduced, serializable output of one handler execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResponse {
    pub terminal: Option<Terminal>,
    #[serde(default)]
    pub follow_ups: Vec<ReplyValue>,
}

impl CanonicalResponse {
    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Fold an action log into its canonical response.
///
/// Only the last terminal-setting action survives; follow-ups accumulate in
/// log order regardless of where they sit relative to the terminal action.
pub fn reduce(actions: &[Action]) -> CanonicalResponse {
    let mut response = CanonicalResponse::default();

    for action in actions {
        match action {
            Action::Reply(reply) => {
                response.terminal = Some(Terminal::Reply(reply.clone()));
            }
            Action::DeferReply(options) => {
                response.terminal = Some(Terminal::Deferred(DeferredMarker::new(options.ephemeral)));
            }
            Action::DeleteReply => {
                response.terminal = None;
            }
            Action::EditReply(reply) => {
                let edited = match response.terminal.take() {
                    Some(Terminal::Deferred(marker)) => resolve_deferred(marker, reply),
                    _ => reply.clone(),
                };
                response.terminal = Some(Terminal::Reply(edited));
            }
            Action::FollowUp(reply) => {
                response.follow_ups.push(reply.clone());
            }
            Action::ShowModal(modal) => {
                response.terminal = Some(Terminal::Modal(ModalMarker::new(modal.clone())));
            }
        }
    }

    response
}

/// An edit on a deferred reply becomes the reply itself. The defer decides
/// visibility: its `ephemeral` flag replaces whatever the edit carried.
fn resolve_deferred(marker: DeferredMarker, edit: &ReplyValue) -> ReplyValue {
    let mut message = edit.clone().into_message();
    match marker.ephemeral {
        Some(ephemeral) => {
            message.insert("ephemeral".into(), Value::Bool(ephemeral));
        }
        None => {
            message.remove("ephemeral");
        }
    }
    ReplyValue::Message(message)
}
