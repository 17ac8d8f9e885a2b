use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures_util::FutureExt;
use tracing::{debug, error, trace};

use pregen_core::{Category, HandlerKey};

use crate::cache::{CacheOutcome, ValidationCache};
use crate::classify::Staticity;
use crate::context::InteractionContext;
use crate::error::{EngineError, Result};
use crate::handler::{panic_message, run_guarded, Handler, Session};

/// A live interaction addressed to a handler identity.
pub struct InboundEvent {
    pub name: String,
    pub category: Category,
    pub context: Arc<dyn InteractionContext>,
}

impl InboundEvent {
    pub fn new(
        name: impl Into<String>,
        category: Category,
        context: Arc<dyn InteractionContext>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            context,
        }
    }

    pub fn key(&self) -> HandlerKey {
        HandlerKey::new(self.name.clone(), self.category)
    }
}

impl fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundEvent")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No handler has this identity.
    Dropped,
    Replayed,
    Regenerated,
    /// A dynamic handler ran against the live interaction.
    Live,
    /// The handler failed; the failure was logged.
    Failed,
}

/// A handler together with its derived staticity.
pub struct RegisteredHandler<S: Session> {
    pub handler: Arc<Handler<S>>,
    pub staticity: Staticity,
}

impl<S: Session> Clone for RegisteredHandler<S> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            staticity: self.staticity,
        }
    }
}

/// The dispatch table, replaced wholesale after each pregeneration pass.
pub struct HandlerTable<S: Session> {
    entries: HashMap<HandlerKey, RegisteredHandler<S>>,
}

impl<S: Session> Default for HandlerTable<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S: Session> HandlerTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handler: Arc<Handler<S>>, staticity: Staticity) {
        let key = handler.key().clone();
        self.entries
            .insert(key, RegisteredHandler { handler, staticity });
    }

    pub fn get(&self, key: &HandlerKey) -> Option<&RegisteredHandler<S>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Routes inbound events to their handler.
///
/// Every dispatch runs inside a failure boundary: errors and panics are
/// logged with the handler's identity and never escape.
pub struct Dispatcher<S: Session> {
    table: RwLock<Arc<HandlerTable<S>>>,
    cache: Arc<ValidationCache>,
    session: Arc<S>,
}

impl<S: Session> Dispatcher<S> {
    pub fn new(cache: Arc<ValidationCache>, session: Arc<S>) -> Self {
        Self {
            table: RwLock::new(Arc::new(HandlerTable::new())),
            cache,
            session,
        }
    }

    pub fn install(&self, table: HandlerTable<S>) {
        let count = table.len();
        *self.table.write().expect("handler table poisoned") = Arc::new(table);
        debug!(count, "dispatch table installed");
    }

    pub fn table(&self) -> Arc<HandlerTable<S>> {
        Arc::clone(&self.table.read().expect("handler table poisoned"))
    }

    pub fn lookup(&self, key: &HandlerKey) -> Option<RegisteredHandler<S>> {
        self.table
            .read()
            .expect("handler table poisoned")
            .get(key)
            .cloned()
    }

    pub fn cache(&self) -> &Arc<ValidationCache> {
        &self.cache
    }

    pub async fn dispatch(&self, event: InboundEvent) -> DispatchOutcome {
        let key = event.key();
        let Some(entry) = self.lookup(&key) else {
            trace!(name = %key.name, category = %key.category, "no handler, dropped");
            return DispatchOutcome::Dropped;
        };

        let run = self.run(entry, event.context);
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(outcome)) => {
                debug!(name = %key.name, category = %key.category, ?outcome, "dispatched");
                outcome
            }
            Ok(Err(e)) => {
                error!(
                    name = %key.name,
                    category = %key.category,
                    code = e.code(),
                    error = %e,
                    "handler failed"
                );
                DispatchOutcome::Failed
            }
            Err(panic) => {
                error!(
                    name = %key.name,
                    category = %key.category,
                    panic = %panic_message(panic.as_ref()),
                    "handler panicked"
                );
                DispatchOutcome::Failed
            }
        }
    }

    async fn run(
        &self,
        entry: RegisteredHandler<S>,
        live: Arc<dyn InteractionContext>,
    ) -> Result<DispatchOutcome> {
        let session = Arc::clone(&self.session);
        match entry.staticity {
            Staticity::Static => {
                let outcome = self
                    .cache
                    .validate_and_cache(&*entry.handler, live, session)
                    .await?;
                Ok(match outcome {
                    CacheOutcome::Replayed => DispatchOutcome::Replayed,
                    CacheOutcome::Regenerated => DispatchOutcome::Regenerated,
                })
            }
            Staticity::Dynamic => {
                run_guarded(entry.handler.invoke(live, session))
                    .await
                    .map_err(|e| EngineError::HandlerExecution {
                        key: entry.handler.key().clone(),
                        message: format!("{e:#}"),
                    })?;
                Ok(DispatchOutcome::Live)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::handler::HandlerConfig;
    use crate::store::MemoryStore;
    use crate::testing::{ManualClock, RecordingSession, ScriptedInteraction};

    fn dispatcher() -> Dispatcher<RecordingSession> {
        let cache = ValidationCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
            60,
        );
        Dispatcher::new(Arc::new(cache), Arc::new(RecordingSession::new()))
    }

    fn echo() -> Handler<RecordingSession> {
        Handler::new(
            HandlerKey::new("echo-modal", Category::Modal),
            HandlerConfig::new(),
            |ctx, _session| async move {
                let text = ctx.input("echo")?.unwrap_or_default();
                ctx.reply(format!("You said: {text}").into()).await?;
                anyhow::Ok(())
            },
        )
    }

    #[tokio::test]
    async fn unknown_identity_is_dropped() {
        let dispatcher = dispatcher();
        let live = Arc::new(ScriptedInteraction::new());
        let outcome = dispatcher
            .dispatch(InboundEvent::new("nope", Category::Command, live.clone()))
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert!(live.calls().is_empty());
    }

    #[tokio::test]
    async fn dynamic_handler_runs_against_live_context() {
        let dispatcher = dispatcher();
        let mut table = HandlerTable::new();
        table.insert(Arc::new(echo()), Staticity::Dynamic);
        dispatcher.install(table);

        let live = Arc::new(ScriptedInteraction::new().with_input("echo", "hello"));
        let outcome = dispatcher
            .dispatch(InboundEvent::new("echo-modal", Category::Modal, live.clone()))
            .await;

        assert_eq!(outcome, DispatchOutcome::Live);
        assert_eq!(live.calls(), vec![Action::Reply("You said: hello".into())]);
    }

    #[tokio::test]
    async fn category_is_part_of_identity() {
        let dispatcher = dispatcher();
        let mut table = HandlerTable::new();
        table.insert(Arc::new(echo()), Staticity::Dynamic);
        dispatcher.install(table);

        let outcome = dispatcher
            .dispatch(InboundEvent::new(
                "echo-modal",
                Category::Button,
                Arc::new(ScriptedInteraction::new()),
            ))
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped);
    }

    #[tokio::test]
    async fn failures_and_panics_are_contained() {
        let dispatcher = dispatcher();
        let mut table = HandlerTable::new();
        table.insert(
            Arc::new(Handler::new(
                HandlerKey::command("err"),
                HandlerConfig::new(),
                |_ctx, _session| async { Err::<(), _>(anyhow::anyhow!("nope")) },
            )),
            Staticity::Dynamic,
        );
        table.insert(
            Arc::new(Handler::new(
                HandlerKey::command("panic"),
                HandlerConfig::new(),
                |_ctx, _session| async {
                    if true {
                        panic!("boom");
                    }
                    anyhow::Ok(())
                },
            )),
            Staticity::Static,
        );
        dispatcher.install(table);

        for name in ["err", "panic"] {
            let outcome = dispatcher
                .dispatch(InboundEvent::new(
                    name,
                    Category::Command,
                    Arc::new(ScriptedInteraction::new()),
                ))
                .await;
            assert_eq!(outcome, DispatchOutcome::Failed);
        }
    }
}
