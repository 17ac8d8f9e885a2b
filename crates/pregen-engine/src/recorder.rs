use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use pregen_core::HandlerKey;

use crate::action::{Action, DeferOptions, ModalPayload, ReplyValue};
use crate::context::{InteractionContext, RequestField};
use crate::error::{EngineError, Result};
use crate::response::{reduce, CanonicalResponse};

/// Capability-set proxy handed to a handler body.
///
/// Every response operation is appended to the action log and, when a live
/// interaction is attached, forwarded to it. Request data is only handed out
/// to handlers explicitly marked static; everyone else gets a
/// `ClassificationViolation`, which is how the dry run detects dynamic
/// handlers. The first violating field is also remembered, so a body that
/// swallows the error is still caught.
pub struct Recorder {
    key: HandlerKey,
    hint: Option<bool>,
    live: Option<Arc<dyn InteractionContext>>,
    log: Mutex<Vec<Action>>,
    violation: Mutex<Option<String>>,
}

impl Recorder {
    /// A recorder with no live target, used for classification.
    pub fn dry(key: HandlerKey, hint: Option<bool>) -> Self {
        Self {
            key,
            hint,
            live: None,
            log: Mutex::new(Vec::new()),
            violation: Mutex::new(None),
        }
    }

    /// A recorder that forwards to a live interaction, used for regeneration.
    pub fn bound(key: HandlerKey, hint: Option<bool>, live: Arc<dyn InteractionContext>) -> Self {
        Self {
            live: Some(live),
            ..Self::dry(key, hint)
        }
    }

    pub fn key(&self) -> &HandlerKey {
        &self.key
    }

    pub fn is_dry(&self) -> bool {
        self.live.is_none()
    }

    /// Snapshot of the action log in call order.
    pub fn actions(&self) -> Vec<Action> {
        self.log.lock().expect("action log poisoned").clone()
    }

    /// Reduce the current log.
    pub fn response(&self) -> CanonicalResponse {
        let log = self.log.lock().expect("action log poisoned");
        reduce(&log)
    }

    /// The first request field read without permission, if any.
    pub fn violation(&self) -> Option<String> {
        self.violation.lock().expect("violation poisoned").clone()
    }

    fn record(&self, action: Action) {
        debug!(
            name = %self.key.name,
            category = %self.key.category,
            action = %action.kind(),
            dry = self.is_dry(),
            "action recorded"
        );
        self.log.lock().expect("action log poisoned").push(action);
    }
}

#[async_trait]
impl InteractionContext for Recorder {
    async fn reply(&self, reply: ReplyValue) -> Result<()> {
        self.record(Action::Reply(reply.clone()));
        match &self.live {
            Some(live) => live.reply(reply).await,
            None => Ok(()),
        }
    }

    async fn defer_reply(&self, options: DeferOptions) -> Result<()> {
        self.record(Action::DeferReply(options));
        match &self.live {
            Some(live) => live.defer_reply(options).await,
            None => Ok(()),
        }
    }

    async fn delete_reply(&self) -> Result<()> {
        self.record(Action::DeleteReply);
        match &self.live {
            Some(live) => live.delete_reply().await,
            None => Ok(()),
        }
    }

    async fn edit_reply(&self, reply: ReplyValue) -> Result<()> {
        self.record(Action::EditReply(reply.clone()));
        match &self.live {
            Some(live) => live.edit_reply(reply).await,
            None => Ok(()),
        }
    }

    async fn follow_up(&self, reply: ReplyValue) -> Result<()> {
        self.record(Action::FollowUp(reply.clone()));
        match &self.live {
            Some(live) => live.follow_up(reply).await,
            None => Ok(()),
        }
    }

    async fn show_modal(&self, modal: ModalPayload) -> Result<()> {
        self.record(Action::ShowModal(modal.clone()));
        match &self.live {
            Some(live) => live.show_modal(modal).await,
            None => Ok(()),
        }
    }

    fn request(&self, field: RequestField<'_>) -> Result<Value> {
        if self.hint != Some(true) {
            let field = field.to_string();
            self.violation
                .lock()
                .expect("violation poisoned")
                .get_or_insert_with(|| field.clone());
            return Err(EngineError::ClassificationViolation {
                key: self.key.clone(),
                field,
            });
        }

        if self.is_dry() {
            warn!(
                name = %self.key.name,
                category = %self.key.category,
                %field,
                "explicitly static handler reads dynamic request data"
            );
        } else {
            debug!(
                name = %self.key.name,
                category = %self.key.category,
                %field,
                "static handler reads request data"
            );
        }

        Ok(match &self.live {
            Some(live) => live.request(field).unwrap_or(Value::Null),
            None => Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Terminal;
    use crate::testing::ScriptedInteraction;
    use pregen_core::Category;

    fn key() -> HandlerKey {
        HandlerKey::command("greet")
    }

    #[tokio::test]
    async fn dry_recorder_logs_without_target() {
        let recorder = Recorder::dry(key(), None);
        recorder.reply("hi".into()).await.unwrap();
        recorder.follow_up("more".into()).await.unwrap();

        assert_eq!(
            recorder.actions(),
            vec![Action::Reply("hi".into()), Action::FollowUp("more".into())]
        );
        assert_eq!(
            recorder.response().terminal,
            Some(Terminal::Reply("hi".into()))
        );
    }

    #[tokio::test]
    async fn bound_recorder_forwards_to_live() {
        let live = Arc::new(ScriptedInteraction::new());
        let recorder = Recorder::bound(key(), None, live.clone());

        recorder.defer_reply(DeferOptions::ephemeral()).await.unwrap();
        recorder.edit_reply("done".into()).await.unwrap();

        assert_eq!(live.calls(), recorder.actions());
    }

    #[test]
    fn request_data_is_a_violation_without_hint() {
        let recorder = Recorder::dry(key(), None);
        let err = recorder.user().unwrap_err();
        assert!(err.is_classification_violation());

        let recorder = Recorder::dry(HandlerKey::new("b", Category::Button), Some(false));
        assert!(recorder.values().unwrap_err().is_classification_violation());
    }

    #[test]
    fn swallowed_violation_is_remembered() {
        let recorder = Recorder::dry(key(), None);
        assert_eq!(recorder.violation(), None);

        let name = recorder
            .option_str("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "world".into());
        let _ = recorder.user();

        assert_eq!(name, "world");
        assert_eq!(recorder.violation().as_deref(), Some("option:name"));
    }

    #[test]
    fn hinted_reads_are_not_violations() {
        let recorder = Recorder::dry(key(), Some(true));
        recorder.user().unwrap();
        assert_eq!(recorder.violation(), None);
    }

    #[test]
    fn explicitly_static_gets_safe_default() {
        let recorder = Recorder::dry(key(), Some(true));
        assert_eq!(recorder.user().unwrap(), Default::default());
        assert_eq!(recorder.option("name").unwrap(), Value::Null);
    }

    #[test]
    fn explicitly_static_reads_live_value_when_bound() {
        let live = Arc::new(ScriptedInteraction::new().with_option("name", "ada"));
        let recorder = Recorder::bound(key(), Some(true), live);
        assert_eq!(recorder.option_str("name").unwrap().as_deref(), Some("ada"));
        assert!(!recorder.is_dry());
        assert_eq!(recorder.violation(), None);
    }
}
