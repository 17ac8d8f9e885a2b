//! Interaction callback bodies in Discord's wire format.
//!
//! Replies carry the convenience boolean `ephemeral`; Discord only knows the
//! message flag, so it is folded into `flags` here.

use serde_json::{json, Map, Value};

use pregen_engine::{DeferOptions, ModalPayload, ReplyValue};

/// `MessageFlags::EPHEMERAL`.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Callback types.
pub const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
pub const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 5;
pub const MODAL: u8 = 9;

fn take_ephemeral(map: &mut Map<String, Value>) -> bool {
    matches!(map.remove("ephemeral"), Some(Value::Bool(true)))
}

fn set_flag(map: &mut Map<String, Value>, flag: u64, on: bool) {
    let flags = map.get("flags").and_then(Value::as_u64).unwrap_or(0);
    let flags = if on { flags | flag } else { flags & !flag };
    if flags == 0 {
        map.remove("flags");
    } else {
        map.insert("flags".into(), Value::from(flags));
    }
}

/// Message body for a reply or follow-up.
pub fn message_body(reply: ReplyValue) -> Value {
    let mut map = reply.into_message();
    if take_ephemeral(&mut map) {
        set_flag(&mut map, EPHEMERAL_FLAG, true);
    }
    Value::Object(map)
}

/// Body for editing the original response. Visibility was fixed when the
/// response was created, so the ephemeral bit is dropped.
pub fn edit_body(reply: ReplyValue) -> Value {
    let mut map = reply.into_message();
    take_ephemeral(&mut map);
    set_flag(&mut map, EPHEMERAL_FLAG, false);
    Value::Object(map)
}

pub fn reply_response(reply: ReplyValue) -> Value {
    json!({
        "type": CHANNEL_MESSAGE_WITH_SOURCE,
        "data": message_body(reply),
    })
}

pub fn defer_response(options: DeferOptions) -> Value {
    if options.ephemeral == Some(true) {
        json!({
            "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE,
            "data": { "flags": EPHEMERAL_FLAG },
        })
    } else {
        json!({ "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE })
    }
}

pub fn modal_response(modal: &ModalPayload) -> Value {
    json!({
        "type": MODAL,
        "data": modal.as_value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregen_engine::{Modal, TextInput};

    #[test]
    fn ephemeral_becomes_flag() {
        let body = message_body(ReplyValue::ephemeral("secret"));
        assert_eq!(body, json!({"content": "secret", "flags": 64}));
    }

    #[test]
    fn existing_flags_are_preserved() {
        let reply = ReplyValue::from_json(json!({"content": "x", "flags": 4, "ephemeral": true}));
        assert_eq!(message_body(reply)["flags"], 68);
    }

    #[test]
    fn shorthand_reply_is_wrapped() {
        assert_eq!(
            reply_response("hi".into()),
            json!({"type": 4, "data": {"content": "hi"}})
        );
    }

    #[test]
    fn edit_drops_visibility() {
        let reply = ReplyValue::from_json(json!({"content": "x", "flags": 68, "ephemeral": true}));
        assert_eq!(edit_body(reply), json!({"content": "x", "flags": 4}));
    }

    #[test]
    fn defer_carries_ephemeral_flag() {
        assert_eq!(
            defer_response(DeferOptions::ephemeral()),
            json!({"type": 5, "data": {"flags": 64}})
        );
        assert_eq!(defer_response(DeferOptions::default()), json!({"type": 5}));
    }

    #[test]
    fn modal_uses_normalized_payload() {
        let payload: ModalPayload = Modal::new("echo-modal", "Echo")
            .input(TextInput::short("echo", "Echo"))
            .into();
        let body = modal_response(&payload);
        assert_eq!(body["type"], 9);
        assert_eq!(body["data"]["custom_id"], "echo-modal");
    }
}
