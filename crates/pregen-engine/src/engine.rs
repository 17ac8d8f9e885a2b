use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use pregen_core::config::{
    DEFAULT_CACHE_EXPIRY_SECS, DEFAULT_RELOAD_DEBOUNCE_MS, SLOW_GENERATION_WARN_SECS,
};
use pregen_core::{Mode, PregenConfig};

use crate::cache::ValidationCache;
use crate::classify::{ClassificationReport, Classifier};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::{Dispatcher, HandlerTable};
use crate::error::{EngineError, Result};
use crate::events::{EventListeners, EventSource};
use crate::handler::{HandlerSource, Session};
use crate::registry::Registry;
use crate::reload::ReloadCoordinator;
use crate::store::CacheStore;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub mode: Mode,
    /// Revalidation window for handlers without their own.
    pub default_window_secs: u64,
    pub serialize_regeneration: bool,
    pub reload_debounce: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            default_window_secs: DEFAULT_CACHE_EXPIRY_SECS,
            serialize_regeneration: true,
            reload_debounce: Duration::from_millis(DEFAULT_RELOAD_DEBOUNCE_MS),
        }
    }
}

impl EngineOptions {
    pub fn from_config(mode: Mode, config: &PregenConfig) -> Self {
        Self {
            mode,
            default_window_secs: config.cache.expiry_secs,
            serialize_regeneration: config.cache.serialize_regeneration,
            reload_debounce: Duration::from_millis(config.watch.debounce_ms),
        }
    }
}

/// Owns the handler sources and runs pregeneration passes over them.
///
/// The startup pass clears stale output (development), discovers handlers,
/// pushes command metadata once, dry-runs every handler concurrently and
/// installs the resulting dispatch table. Handlers are compiled in, so a
/// reload cannot add, remove or change one: it only dry-runs them again, which
/// refreshes snapshots of handlers whose output depends on files or other
/// outside state.
pub struct Engine<S: Session> {
    options: EngineOptions,
    sources: Vec<HandlerSource<S>>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    session: Arc<S>,
    dispatcher: Arc<Dispatcher<S>>,
    listeners: Arc<EventListeners<S>>,
    reload: Arc<ReloadCoordinator>,
}

impl<S: Session> Engine<S> {
    pub fn new(
        options: EngineOptions,
        sources: Vec<HandlerSource<S>>,
        store: Arc<dyn CacheStore>,
        session: Arc<S>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dispatcher = build_dispatcher(&options, &store, &clock, &session);
        let reload = ReloadCoordinator::new(options.reload_debounce);
        let listeners = Arc::new(EventListeners::new(Arc::clone(&session)));
        Self {
            options,
            sources,
            store,
            clock,
            session,
            dispatcher,
            listeners,
            reload,
        }
    }

    /// Replace the wall clock. Call before the first pass.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.dispatcher = build_dispatcher(&self.options, &self.store, &clock, &self.session);
        self.clock = clock;
        self
    }

    /// Attach gateway event listeners.
    pub fn with_events(mut self, sources: Vec<EventSource<S>>) -> Self {
        let listeners = EventListeners::discover(sources, Arc::clone(&self.session));
        info!(count = listeners.len(), "event listeners loaded");
        self.listeners = Arc::new(listeners);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher<S>> {
        Arc::clone(&self.dispatcher)
    }

    pub fn listeners(&self) -> Arc<EventListeners<S>> {
        Arc::clone(&self.listeners)
    }

    pub fn reload_coordinator(&self) -> Arc<ReloadCoordinator> {
        Arc::clone(&self.reload)
    }

    /// Run the startup pass. Registration failures are fatal.
    pub async fn prepare(&self) -> Result<ClassificationReport> {
        self.pass(true).await
    }

    async fn pass(&self, startup: bool) -> Result<ClassificationReport> {
        let mode = self.options.mode;
        let started = Instant::now();
        info!(%mode, startup, "pregenerating handlers");

        if startup && mode.clears_output() {
            self.store.clear()?;
        }

        let registry = Registry::discover(self.sources.iter().cloned());

        if startup && mode.registers_commands() {
            let specs = registry.command_specs();
            let count = self
                .session
                .register_commands(&specs)
                .await
                .map_err(|e| match e {
                    EngineError::Registration(_) => e,
                    other => EngineError::Registration(other.to_string()),
                })?;
            info!(count, "commands registered");
        }

        let advisory = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(SLOW_GENERATION_WARN_SECS)).await;
            warn!(
                "pregeneration is taking longer than {SLOW_GENERATION_WARN_SECS}s, \
                 a handler may be waiting on something that never resolves"
            );
        });

        let classifier = Classifier::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            Arc::clone(&self.session),
            mode.writes_output(),
        );
        let results = join_all(
            registry
                .handlers()
                .iter()
                .map(|handler| classifier.classify(handler.as_ref())),
        )
        .await;
        advisory.abort();

        let mut table = HandlerTable::new();
        for (handler, result) in registry.handlers().iter().zip(&results) {
            table.insert(Arc::clone(handler), result.staticity);
        }
        self.dispatcher.install(table);

        let report = ClassificationReport::new(results);
        info!(
            handlers = report.len(),
            statics = report.static_count(),
            dynamics = report.dynamic_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pregeneration complete"
        );
        Ok(report)
    }

    /// Dry-run every handler again unless a reload is already running or
    /// one just started. Output is overwritten in place and commands are not
    /// registered again. Returns `None` when the reload was skipped.
    pub async fn reload(&self) -> Result<Option<ClassificationReport>> {
        let Some(_guard) = self.reload.try_begin() else {
            debug!("reload skipped");
            return Ok(None);
        };
        self.pass(false).await.map(Some)
    }
}

fn build_dispatcher<S: Session>(
    options: &EngineOptions,
    store: &Arc<dyn CacheStore>,
    clock: &Arc<dyn Clock>,
    session: &Arc<S>,
) -> Arc<Dispatcher<S>> {
    let cache = ValidationCache::new(
        Arc::clone(store),
        Arc::clone(clock),
        options.default_window_secs,
    )
    .serialize_regeneration(options.serialize_regeneration);
    Arc::new(Dispatcher::new(Arc::new(cache), Arc::clone(session)))
}
