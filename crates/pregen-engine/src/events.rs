//! Gateway event listeners.
//!
//! A listener is declared at `events/<...>/<EventName>` and runs every time
//! the platform emits that event. Listeners are never classified or cached;
//! each run is logged and a failure never reaches the gateway loop.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::handler::{run_guarded, HandlerFuture, Session};

/// Gateway events a listener can subscribe to, named after the file that
/// declares the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    ClientReady,
    GuildCreate,
    GuildDelete,
    GuildMemberAdd,
    GuildMemberRemove,
    MessageCreate,
}

impl EventName {
    pub const ALL: [EventName; 6] = [
        EventName::ClientReady,
        EventName::GuildCreate,
        EventName::GuildDelete,
        EventName::GuildMemberAdd,
        EventName::GuildMemberRemove,
        EventName::MessageCreate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::ClientReady => "ClientReady",
            EventName::GuildCreate => "GuildCreate",
            EventName::GuildDelete => "GuildDelete",
            EventName::GuildMemberAdd => "GuildMemberAdd",
            EventName::GuildMemberRemove => "GuildMemberRemove",
            EventName::MessageCreate => "MessageCreate",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unknown event: {s}"))
    }
}

/// One emitted gateway event. `payload` is the platform's JSON for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub name: EventName,
    pub payload: Value,
}

impl GatewayEvent {
    pub fn new(name: EventName, payload: Value) -> Self {
        Self { name, payload }
    }
}

/// A listener body: `(session, event) -> future<result>`.
pub type ListenerBody<S> = Arc<dyn Fn(Arc<S>, GatewayEvent) -> HandlerFuture + Send + Sync>;

pub struct EventSource<S: Session> {
    pub location: String,
    pub body: ListenerBody<S>,
}

impl<S: Session> EventSource<S> {
    pub fn new<F, Fut>(location: impl Into<String>, body: F) -> Self
    where
        F: Fn(Arc<S>, GatewayEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            location: location.into(),
            body: Arc::new(move |session: Arc<S>, event: GatewayEvent| {
                Box::pin(body(session, event)) as HandlerFuture
            }),
        }
    }
}

impl<S: Session> Clone for EventSource<S> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<S: Session> fmt::Debug for EventSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// The event a location subscribes to: `events/<...>/<EventName>`, with an
/// optional extension on the last segment.
pub fn parse_event_location(location: &str) -> Option<EventName> {
    let segments: Vec<&str> = location
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let root = segments.iter().position(|s| *s == "events")?;
    let file = segments[root + 1..].last()?;
    let stem = file.split('.').next().unwrap_or(file);
    stem.parse().ok()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitOutcome {
    pub ran: usize,
    pub failed: usize,
}

/// Listeners grouped by event. Several listeners may share an event; they
/// run concurrently on each emit.
pub struct EventListeners<S: Session> {
    listeners: HashMap<EventName, Vec<(String, ListenerBody<S>)>>,
    session: Arc<S>,
}

impl<S: Session> EventListeners<S> {
    pub fn new(session: Arc<S>) -> Self {
        Self {
            listeners: HashMap::new(),
            session,
        }
    }

    /// Ingest sources. Locations that name no known event are skipped with a
    /// warning.
    pub fn discover(sources: impl IntoIterator<Item = EventSource<S>>, session: Arc<S>) -> Self {
        let mut listeners = Self::new(session);
        for source in sources {
            listeners.ingest(source);
        }
        listeners
    }

    pub fn ingest(&mut self, source: EventSource<S>) -> Option<EventName> {
        let Some(name) = parse_event_location(&source.location) else {
            warn!(location = %source.location, "not a known event, listener skipped");
            return None;
        };
        debug!(event = %name, location = %source.location, "listener loaded");
        self.listeners
            .entry(name)
            .or_default()
            .push((source.location, source.body));
        Some(name)
    }

    /// Events with at least one listener.
    pub fn events(&self) -> Vec<EventName> {
        EventName::ALL
            .into_iter()
            .filter(|name| self.listeners.contains_key(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Run every listener for `event`. Failures and panics are logged and
    /// counted, never returned.
    pub async fn emit(&self, event: GatewayEvent) -> EmitOutcome {
        let Some(listeners) = self.listeners.get(&event.name) else {
            return EmitOutcome::default();
        };

        let runs = listeners.iter().map(|(location, body)| {
            let fut = body(Arc::clone(&self.session), event.clone());
            async move { (location, run_guarded(fut).await) }
        });

        let mut outcome = EmitOutcome::default();
        for (location, result) in join_all(runs).await {
            outcome.ran += 1;
            match result {
                Ok(()) => debug!(event = %event.name, %location, "listener ran"),
                Err(e) => {
                    outcome.failed += 1;
                    error!(event = %event.name, %location, error = %e, "listener failed");
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Source = EventSource<RecordingSession>;

    fn counting(location: &str, count: Arc<AtomicUsize>) -> Source {
        EventSource::new(location, move |_session, _event| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
    }

    #[test]
    fn locations_name_events() {
        assert_eq!(
            parse_event_location("events/ClientReady.rs"),
            Some(EventName::ClientReady)
        );
        assert_eq!(
            parse_event_location("src/events/members/GuildMemberAdd"),
            Some(EventName::GuildMemberAdd)
        );
        assert_eq!(parse_event_location("events/NotAnEvent.rs"), None);
        assert_eq!(parse_event_location("commands/ClientReady.rs"), None);
    }

    #[test]
    fn unknown_events_are_skipped() {
        let listeners = EventListeners::discover(
            vec![
                counting("events/ClientReady.rs", Arc::default()),
                counting("events/Typo.rs", Arc::default()),
            ],
            Arc::new(RecordingSession::new()),
        );
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners.events(), vec![EventName::ClientReady]);
    }

    #[tokio::test]
    async fn emit_runs_every_listener_for_the_event() {
        let ready = Arc::new(AtomicUsize::new(0));
        let joined = Arc::new(AtomicUsize::new(0));
        let listeners = EventListeners::discover(
            vec![
                counting("events/ClientReady.rs", ready.clone()),
                counting("events/other/ClientReady.rs", ready.clone()),
                counting("events/GuildMemberAdd.rs", joined.clone()),
            ],
            Arc::new(RecordingSession::new()),
        );

        let outcome = listeners
            .emit(GatewayEvent::new(EventName::ClientReady, json!({})))
            .await;

        assert_eq!(outcome, EmitOutcome { ran: 2, failed: 0 });
        assert_eq!(ready.load(Ordering::SeqCst), 2);
        assert_eq!(joined.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_are_contained() {
        let ran = Arc::new(AtomicUsize::new(0));
        let listeners = EventListeners::discover(
            vec![
                EventSource::new("events/MessageCreate.rs", |_session, _event| async {
                    Err::<(), _>(anyhow::anyhow!("rate limited"))
                }),
                EventSource::new("events/a/MessageCreate.rs", |_session, _event| async {
                    if true {
                        panic!("bad payload");
                    }
                    anyhow::Ok(())
                }),
                counting("events/b/MessageCreate.rs", ran.clone()),
            ],
            Arc::new(RecordingSession::new()),
        );

        let outcome = listeners
            .emit(GatewayEvent::new(
                EventName::MessageCreate,
                json!({"content": "hi"}),
            ))
            .await;

        assert_eq!(outcome, EmitOutcome { ran: 3, failed: 2 });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_receives_the_payload() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let sink = seen.clone();
        let listeners = EventListeners::discover(
            vec![EventSource::new(
                "events/GuildMemberAdd.rs",
                move |_session: Arc<RecordingSession>, event: GatewayEvent| {
                    let sink = sink.clone();
                    async move {
                        *sink.lock().unwrap() = Some(event.payload);
                        anyhow::Ok(())
                    }
                },
            )],
            Arc::new(RecordingSession::new()),
        );

        listeners
            .emit(GatewayEvent::new(
                EventName::GuildMemberAdd,
                json!({"user": {"id": "7"}}),
            ))
            .await;

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(json!({"user": {"id": "7"}}))
        );
    }

    #[tokio::test]
    async fn events_without_listeners_are_ignored() {
        let listeners: EventListeners<RecordingSession> =
            EventListeners::new(Arc::new(RecordingSession::new()));
        let outcome = listeners
            .emit(GatewayEvent::new(EventName::GuildDelete, Value::Null))
            .await;
        assert_eq!(outcome, EmitOutcome::default());
        assert!(listeners.is_empty());
    }
}
