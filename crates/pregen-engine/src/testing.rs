//! In-memory doubles for the engine's seams: a scripted live interaction,
//! a manual clock and a session that records registrations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::action::{Action, DeferOptions, ModalPayload, ReplyValue};
use crate::clock::Clock;
use crate::context::{InteractionContext, RequestField, UserInfo};
use crate::error::{EngineError, Result};
use crate::handler::{CommandSpec, Session};

/// A live interaction that remembers every response call it receives and
/// serves request data from a fixed table.
#[derive(Debug, Default)]
pub struct ScriptedInteraction {
    calls: Mutex<Vec<Action>>,
    data: HashMap<String, Value>,
}

impl ScriptedInteraction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: UserInfo) -> Self {
        let value = serde_json::to_value(user).unwrap_or(Value::Null);
        self.data.insert(RequestField::User.to_string(), value);
        self
    }

    pub fn with_option(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.data
            .insert(RequestField::Option(name).to_string(), value.into());
        self
    }

    pub fn with_input(mut self, custom_id: &str, value: &str) -> Self {
        self.data.insert(
            RequestField::Input(custom_id).to_string(),
            Value::String(value.to_string()),
        );
        self
    }

    pub fn with_values(mut self, values: &[&str]) -> Self {
        let values = values.iter().map(|v| Value::String(v.to_string())).collect();
        self.data
            .insert(RequestField::Values.to_string(), Value::Array(values));
        self
    }

    pub fn with_custom_id(mut self, custom_id: &str) -> Self {
        self.data.insert(
            RequestField::CustomId.to_string(),
            Value::String(custom_id.to_string()),
        );
        self
    }

    /// Response calls received so far, in order.
    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn push(&self, action: Action) -> Result<()> {
        self.calls.lock().expect("call log poisoned").push(action);
        Ok(())
    }
}

#[async_trait]
impl InteractionContext for ScriptedInteraction {
    async fn reply(&self, reply: ReplyValue) -> Result<()> {
        self.push(Action::Reply(reply))
    }

    async fn defer_reply(&self, options: DeferOptions) -> Result<()> {
        self.push(Action::DeferReply(options))
    }

    async fn delete_reply(&self) -> Result<()> {
        self.push(Action::DeleteReply)
    }

    async fn edit_reply(&self, reply: ReplyValue) -> Result<()> {
        self.push(Action::EditReply(reply))
    }

    async fn follow_up(&self, reply: ReplyValue) -> Result<()> {
        self.push(Action::FollowUp(reply))
    }

    async fn show_modal(&self, modal: ModalPayload) -> Result<()> {
        self.push(Action::ShowModal(modal))
    }

    fn request(&self, field: RequestField<'_>) -> Result<Value> {
        Ok(self
            .data
            .get(&field.to_string())
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs * 1000);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// A session that accepts (or rejects) every registration and keeps a copy.
#[derive(Debug, Default)]
pub struct RecordingSession {
    registrations: Mutex<Vec<Vec<CommandSpec>>>,
    reject: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose platform refuses every command list.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Every command list pushed so far, oldest first.
    pub fn registrations(&self) -> Vec<Vec<CommandSpec>> {
        self.registrations
            .lock()
            .expect("registrations poisoned")
            .clone()
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<usize> {
        if self.reject {
            return Err(EngineError::Registration(
                "invalid command metadata".to_string(),
            ));
        }
        self.registrations
            .lock()
            .expect("registrations poisoned")
            .push(commands.to_vec());
        Ok(commands.len())
    }
}
