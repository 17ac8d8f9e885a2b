//! Dry-run classification of handlers into static and dynamic.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, warn};

use pregen_core::{Category, HandlerKey};

use crate::clock::Clock;
use crate::error::EngineError;
use crate::handler::{panic_message, run_guarded, Handler, HandlerFuture, Session};
use crate::recorder::Recorder;
use crate::store::{CacheEntry, CacheStore};

/// Outcome of polling a handler body exactly once.
pub enum DryRun {
    Resolved,
    /// The body could not finish on its first poll. The future is kept so an
    /// explicitly static handler can still be driven to completion.
    Pending(HandlerFuture),
    Failed(anyhow::Error),
}

impl fmt::Debug for DryRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DryRun::Resolved => f.write_str("Resolved"),
            DryRun::Pending(_) => f.write_str("Pending"),
            DryRun::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

impl DryRun {
    /// Poll `fut` once. Panics are caught and reported as failures.
    pub fn poll_once(mut fut: HandlerFuture) -> Self {
        let polled = AssertUnwindSafe(&mut fut).catch_unwind().now_or_never();
        match polled {
            None => DryRun::Pending(fut),
            Some(Ok(Ok(()))) => DryRun::Resolved,
            Some(Ok(Err(e))) => DryRun::Failed(e),
            Some(Err(panic)) => DryRun::Failed(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staticity {
    Static,
    Dynamic,
}

/// Why a handler ended up on its side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyReason {
    /// `pregenerated: false`.
    ForcedDynamic,
    /// `pregenerated: true`.
    ForcedStatic,
    /// Read request data during the dry run.
    RequestData(String),
    /// Could not complete synchronously.
    Pending,
    /// Returned an error or panicked.
    Failed(String),
    /// Completed without a terminal response.
    NoTerminal,
    /// Completed with a terminal response and touched no request data.
    Answered,
}

impl fmt::Display for ClassifyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyReason::ForcedDynamic => write!(f, "marked dynamic"),
            ClassifyReason::ForcedStatic => write!(f, "marked static"),
            ClassifyReason::RequestData(field) => write!(f, "reads `{field}`"),
            ClassifyReason::Pending => write!(f, "does not complete synchronously"),
            ClassifyReason::Failed(message) => write!(f, "failed: {message}"),
            ClassifyReason::NoTerminal => write!(f, "produced no response"),
            ClassifyReason::Answered => write!(f, "answered without request data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub key: HandlerKey,
    pub staticity: Staticity,
    pub reason: ClassifyReason,
    /// Whether a snapshot was written during classification.
    pub persisted: bool,
}

impl Classification {
    fn dynamic(key: HandlerKey, reason: ClassifyReason) -> Self {
        Self {
            key,
            staticity: Staticity::Dynamic,
            reason,
            persisted: false,
        }
    }

    fn statik(key: HandlerKey, reason: ClassifyReason, persisted: bool) -> Self {
        Self {
            key,
            staticity: Staticity::Static,
            reason,
            persisted,
        }
    }

    pub fn is_static(&self) -> bool {
        self.staticity == Staticity::Static
    }
}

/// Runs each handler once with no live interaction and decides its staticity.
pub struct Classifier<S: Session> {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    session: Arc<S>,
    persist: bool,
}

impl<S: Session> Classifier<S> {
    /// `persist` controls whether static snapshots are written.
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        session: Arc<S>,
        persist: bool,
    ) -> Self {
        Self {
            store,
            clock,
            session,
            persist,
        }
    }

    pub async fn classify(&self, handler: &Handler<S>) -> Classification {
        let key = handler.key().clone();
        let hint = handler.hint();

        if hint == Some(false) {
            debug!(name = %key.name, category = %key.category, "marked dynamic, dry run skipped");
            return Classification::dynamic(key, ClassifyReason::ForcedDynamic);
        }
        let explicit = hint == Some(true);

        let recorder = Arc::new(Recorder::dry(key.clone(), hint));
        let fut = handler.invoke(recorder.clone(), Arc::clone(&self.session));

        match DryRun::poll_once(fut) {
            DryRun::Resolved => {}
            DryRun::Pending(fut) => {
                if !explicit {
                    debug!(name = %key.name, category = %key.category, "dry run pending");
                    return Classification::dynamic(key, ClassifyReason::Pending);
                }
                if let Err(e) = run_guarded(fut).await {
                    warn!(
                        name = %key.name,
                        category = %key.category,
                        error = %e,
                        "static handler failed during pregeneration, will generate on first use"
                    );
                    return Classification::statik(
                        key,
                        ClassifyReason::Failed(e.to_string()),
                        false,
                    );
                }
            }
            DryRun::Failed(e) => {
                let violation = e
                    .downcast_ref::<EngineError>()
                    .and_then(|err| match err {
                        EngineError::ClassificationViolation { field, .. } => Some(field.clone()),
                        _ => None,
                    })
                    .or_else(|| recorder.violation());

                if explicit {
                    warn!(
                        name = %key.name,
                        category = %key.category,
                        error = %e,
                        "static handler failed during pregeneration, will generate on first use"
                    );
                    return Classification::statik(
                        key,
                        ClassifyReason::Failed(e.to_string()),
                        false,
                    );
                }

                return match violation {
                    Some(field) => {
                        debug!(name = %key.name, category = %key.category, %field, "reads request data");
                        Classification::dynamic(key, ClassifyReason::RequestData(field))
                    }
                    None => {
                        warn!(
                            name = %key.name,
                            category = %key.category,
                            error = %e,
                            "dry run failed, treating handler as dynamic"
                        );
                        Classification::dynamic(key, ClassifyReason::Failed(e.to_string()))
                    }
                };
            }
        }

        if let Some(field) = recorder.violation() {
            debug!(name = %key.name, category = %key.category, %field, "reads request data");
            return Classification::dynamic(key, ClassifyReason::RequestData(field));
        }

        let response = recorder.response();
        if !response.has_terminal() && !explicit {
            debug!(name = %key.name, category = %key.category, "no terminal response");
            return Classification::dynamic(key, ClassifyReason::NoTerminal);
        }

        let reason = if explicit {
            ClassifyReason::ForcedStatic
        } else {
            ClassifyReason::Answered
        };

        let persisted = self.persist && {
            let entry = CacheEntry::new(response, self.clock.now_ms());
            match self.store.save(&key, &entry) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        name = %key.name,
                        category = %key.category,
                        error = %e,
                        "failed to persist pregenerated response"
                    );
                    false
                }
            }
        };

        debug!(name = %key.name, category = %key.category, persisted, "static");
        Classification::statik(key, reason, persisted)
    }
}

/// Outcome of one pregeneration pass.
#[derive(Debug, Clone, Default)]
pub struct ClassificationReport {
    entries: Vec<Classification>,
}

impl ClassificationReport {
    pub fn new(entries: Vec<Classification>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Classification] {
        &self.entries
    }

    pub fn get(&self, key: &HandlerKey) -> Option<&Classification> {
        self.entries.iter().find(|c| &c.key == key)
    }

    pub fn static_count(&self) -> usize {
        self.entries.iter().filter(|c| c.is_static()).count()
    }

    pub fn dynamic_count(&self) -> usize {
        self.entries.len() - self.static_count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const SECTIONS: [(Category, &str); 4] = [
    (Category::Command, "Commands"),
    (Category::Button, "Buttons"),
    (Category::Select, "Select menus"),
    (Category::Modal, "Modals"),
];

/// Tree per category, `○` for static and `ƒ` for dynamic, followed by a legend.
impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (category, title) in SECTIONS {
            let mut items: Vec<&Classification> = self
                .entries
                .iter()
                .filter(|c| c.key.category == category)
                .collect();
            if items.is_empty() {
                continue;
            }
            items.sort_by(|a, b| a.key.name.cmp(&b.key.name));

            writeln!(f, "{title}")?;
            let last = items.len() - 1;
            for (i, item) in items.iter().enumerate() {
                let branch = match (i, last) {
                    (_, 0) => "─",
                    (0, _) => "┌",
                    (i, last) if i == last => "└",
                    _ => "├",
                };
                let marker = if item.is_static() { "○" } else { "ƒ" };
                writeln!(f, "{branch} {marker} {}", item.key.name)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "○  (Static)   replayed from the pregenerated response")?;
        write!(f, "ƒ  (Dynamic)  executed on every interaction")
    }
}
