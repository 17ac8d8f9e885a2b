//! Replay of persisted responses and regeneration on miss or expiry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use pregen_core::HandlerKey;

use crate::action::DeferOptions;
use crate::clock::Clock;
use crate::context::InteractionContext;
use crate::error::{CacheMiss, EngineError, Result};
use crate::handler::{run_guarded, Handler, Session};
use crate::recorder::Recorder;
use crate::response::{CanonicalResponse, Terminal};
use crate::store::{CacheEntry, CacheStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// A fresh entry was replayed; the body did not run.
    Replayed,
    /// The body ran live and its response was stored.
    Regenerated,
}

/// Serves static handlers from the store while their entry is fresh.
pub struct ValidationCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    default_window_secs: u64,
    locks: Option<DashMap<HandlerKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ValidationCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, default_window_secs: u64) -> Self {
        Self {
            store,
            clock,
            default_window_secs,
            locks: None,
        }
    }

    /// Serialize regeneration per identity. Concurrent misses wait for the
    /// first one and replay what it stored.
    pub fn serialize_regeneration(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(DashMap::new);
        self
    }

    pub fn default_window_secs(&self) -> u64 {
        self.default_window_secs
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// The stored response for `handler` if it can be replayed right now.
    pub fn fresh_response<S: Session>(&self, handler: &Handler<S>) -> Result<CanonicalResponse> {
        let key = handler.key();
        let entry = self.store.load(key)?;

        if !entry.response.has_terminal() {
            return Err(EngineError::CacheRead {
                key: key.clone(),
                reason: CacheMiss::Empty,
            });
        }

        let window_secs = handler.window_secs(self.default_window_secs);
        let now = self.clock.now_ms();
        if !entry.is_fresh(now, window_secs) {
            return Err(EngineError::CacheRead {
                key: key.clone(),
                reason: CacheMiss::Expired {
                    age_ms: entry.age_ms(now),
                    window_secs,
                },
            });
        }

        Ok(entry.response)
    }

    /// Replay the entry when fresh, otherwise run the body against `live`
    /// through a recorder and store the result.
    pub async fn validate_and_cache<S: Session>(
        &self,
        handler: &Handler<S>,
        live: Arc<dyn InteractionContext>,
        session: Arc<S>,
    ) -> Result<CacheOutcome> {
        let key = handler.key();

        match self.fresh_response(handler) {
            Ok(response) => {
                replay(&response, live.as_ref()).await?;
                debug!(name = %key.name, category = %key.category, "replayed");
                return Ok(CacheOutcome::Replayed);
            }
            Err(EngineError::CacheRead { reason, .. }) => {
                debug!(name = %key.name, category = %key.category, %reason, "regenerating");
            }
            Err(e) => return Err(e),
        }

        let _guard = match &self.locks {
            Some(locks) => {
                let lock = Arc::clone(locks.entry(key.clone()).or_default().value());
                let guard = lock.lock_owned().await;
                if let Ok(response) = self.fresh_response(handler) {
                    replay(&response, live.as_ref()).await?;
                    debug!(name = %key.name, category = %key.category, "replayed after concurrent regeneration");
                    return Ok(CacheOutcome::Replayed);
                }
                Some(guard)
            }
            None => None,
        };

        self.regenerate(handler, live, session).await
    }

    async fn regenerate<S: Session>(
        &self,
        handler: &Handler<S>,
        live: Arc<dyn InteractionContext>,
        session: Arc<S>,
    ) -> Result<CacheOutcome> {
        let key = handler.key();
        let recorder = Arc::new(Recorder::bound(key.clone(), handler.hint(), live));

        run_guarded(handler.invoke(recorder.clone(), session))
            .await
            .map_err(|e| EngineError::HandlerExecution {
                key: key.clone(),
                message: format!("{e:#}"),
            })?;

        let entry = CacheEntry::new(recorder.response(), self.clock.now_ms());
        if let Err(e) = self.store.save(key, &entry) {
            warn!(
                name = %key.name,
                category = %key.category,
                error = %e,
                "failed to store regenerated response"
            );
        }
        Ok(CacheOutcome::Regenerated)
    }
}

/// Issue a canonical response against a live interaction: the terminal
/// operation first, then every follow-up in order.
pub async fn replay(response: &CanonicalResponse, live: &dyn InteractionContext) -> Result<()> {
    match &response.terminal {
        Some(Terminal::Deferred(marker)) => {
            live.defer_reply(DeferOptions {
                ephemeral: marker.ephemeral,
            })
            .await?
        }
        Some(Terminal::Modal(marker)) => live.show_modal(marker.data.clone()).await?,
        Some(Terminal::Reply(reply)) => live.reply(reply.clone()).await?,
        None => {}
    }

    for follow_up in &response.follow_ups {
        live.follow_up(follow_up.clone()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Modal, ModalPayload, ReplyValue, TextInput};
    use crate::handler::HandlerConfig;
    use crate::response::{DeferredMarker, ModalMarker};
    use crate::store::MemoryStore;
    use crate::testing::{ManualClock, RecordingSession, ScriptedInteraction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const T: i64 = 1_700_000_000_000;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        cache: ValidationCache,
        session: Arc<RecordingSession>,
    }

    fn fixture(window_secs: u64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(T));
        let cache = ValidationCache::new(store.clone(), clock.clone(), window_secs)
            .serialize_regeneration(true);
        Fixture {
            store,
            clock,
            cache,
            session: Arc::new(RecordingSession::new()),
        }
    }

    fn counting(name: &str, runs: Arc<AtomicUsize>, text: &'static str) -> Handler<RecordingSession> {
        Handler::new(HandlerKey::command(name), HandlerConfig::new(), move |ctx, _session| {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                ctx.reply(text.into()).await?;
                ctx.follow_up("after".into()).await?;
                anyhow::Ok(())
            }
        })
    }

    #[tokio::test]
    async fn replays_exact_terminal_then_follow_ups() {
        let fx = fixture(60);
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = counting("greet", runs.clone(), "hi");

        let response = CanonicalResponse {
            terminal: Some(Terminal::Deferred(DeferredMarker::new(Some(true)))),
            follow_ups: vec!["one".into(), ReplyValue::content("two")],
        };
        fx.store
            .save(handler.key(), &CacheEntry::new(response, T))
            .unwrap();

        let live = Arc::new(ScriptedInteraction::new());
        let outcome = fx
            .cache
            .validate_and_cache(&handler, live.clone(), fx.session.clone())
            .await
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Replayed);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(
            live.calls(),
            vec![
                Action::DeferReply(DeferOptions::ephemeral()),
                Action::FollowUp("one".into()),
                Action::FollowUp(ReplyValue::content("two")),
            ]
        );
    }

    #[tokio::test]
    async fn replays_stored_modal_then_follow_ups() {
        let fx = fixture(60);
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = counting("feedback", runs.clone(), "unused");

        let modal: ModalPayload = Modal::new("feedback-form", "Feedback")
            .input(TextInput::paragraph("body", "What went wrong?"))
            .into();
        let response = CanonicalResponse {
            terminal: Some(Terminal::Modal(ModalMarker::new(modal.clone()))),
            follow_ups: vec!["thanks".into()],
        };
        fx.store
            .save(handler.key(), &CacheEntry::new(response, T))
            .unwrap();

        fx.clock.advance_secs(30);
        let live = Arc::new(ScriptedInteraction::new());
        let outcome = fx
            .cache
            .validate_and_cache(&handler, live.clone(), fx.session.clone())
            .await
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Replayed);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(
            live.calls(),
            vec![
                Action::ShowModal(modal),
                Action::FollowUp("thanks".into()),
            ]
        );
    }

    #[tokio::test]
    async fn expired_entry_is_regenerated_with_new_stamp() {
        let fx = fixture(60);
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = counting("greet", runs.clone(), "fresh");
        fx.store
            .save(
                handler.key(),
                &CacheEntry::new(
                    CanonicalResponse {
                        terminal: Some(Terminal::Reply("stale".into())),
                        follow_ups: vec![],
                    },
                    T,
                ),
            )
            .unwrap();

        fx.clock.advance_secs(60);
        let live = Arc::new(ScriptedInteraction::new());
        let outcome = fx
            .cache
            .validate_and_cache(&handler, live.clone(), fx.session.clone())
            .await
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Regenerated);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            live.calls(),
            vec![Action::Reply("fresh".into()), Action::FollowUp("after".into())]
        );

        let entry = fx.store.load(handler.key()).unwrap();
        assert!(entry.stamp >= T + 60_000);
        assert_eq!(entry.response.terminal, Some(Terminal::Reply("fresh".into())));
    }

    #[tokio::test]
    async fn corrupt_or_empty_entries_regenerate() {
        let fx = fixture(60);
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = counting("greet", runs.clone(), "hi");

        fx.store.insert_raw(handler.key().clone(), "{\"response\":");
        fx.cache
            .validate_and_cache(&handler, Arc::new(ScriptedInteraction::new()), fx.session.clone())
            .await
            .unwrap();

        fx.store
            .save(
                handler.key(),
                &CacheEntry::new(CanonicalResponse::default(), fx.clock.now_ms()),
            )
            .unwrap();
        let outcome = fx
            .cache
            .validate_and_cache(&handler, Arc::new(ScriptedInteraction::new()), fx.session.clone())
            .await
            .unwrap();

        assert_eq!(outcome, CacheOutcome::Regenerated);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handler_revalidate_overrides_default_window() {
        let fx = fixture(86_400);
        let handler: Handler<RecordingSession> = Handler::new(
            HandlerKey::command("short"),
            HandlerConfig::new().revalidate(5),
            |ctx, _session| async move {
                ctx.reply("x".into()).await?;
                anyhow::Ok(())
            },
        );
        fx.store
            .save(
                handler.key(),
                &CacheEntry::new(
                    CanonicalResponse {
                        terminal: Some(Terminal::Reply("x".into())),
                        follow_ups: vec![],
                    },
                    T,
                ),
            )
            .unwrap();

        fx.clock.advance_secs(4);
        assert!(fx.cache.fresh_response(&handler).is_ok());
        fx.clock.advance_secs(1);
        assert!(matches!(
            fx.cache.fresh_response(&handler),
            Err(EngineError::CacheRead {
                reason: CacheMiss::Expired { window_secs: 5, .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn body_failure_propagates_and_writes_nothing() {
        let fx = fixture(60);
        let handler: Handler<RecordingSession> = Handler::new(
            HandlerKey::command("broken"),
            HandlerConfig::new(),
            |_ctx, _session| async move { Err::<(), _>(anyhow::anyhow!("database down")) },
        );

        let err = fx
            .cache
            .validate_and_cache(&handler, Arc::new(ScriptedInteraction::new()), fx.session.clone())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "HANDLER_EXECUTION_FAILURE");
        assert!(err.to_string().contains("database down"));
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn concurrent_misses_run_the_body_once() {
        let fx = fixture(60);
        let runs = Arc::new(AtomicUsize::new(0));
        let handler = counting("greet", runs.clone(), "hi");

        let first = Arc::new(ScriptedInteraction::new());
        let second = Arc::new(ScriptedInteraction::new());
        let (a, b) = tokio::join!(
            fx.cache
                .validate_and_cache(&handler, first.clone(), fx.session.clone()),
            fx.cache
                .validate_and_cache(&handler, second.clone(), fx.session.clone()),
        );

        assert_eq!(a.unwrap(), CacheOutcome::Regenerated);
        assert_eq!(b.unwrap(), CacheOutcome::Replayed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(first.calls(), second.calls());
    }
}
