//! `pregen-engine`: static/dynamic handler classification and response caching.
//!
//! # Overview
//!
//! Every handler runs once, dry, through a [`recorder::Recorder`] before any
//! live event can reach it. Handlers that answer without touching
//! request-specific data are *static*: their recorded actions are reduced to a
//! [`response::CanonicalResponse`] and persisted. At dispatch time a static
//! handler's response is replayed from the cache while fresh and regenerated
//! (by running the body live through a recorder) once stale. Dynamic handlers
//! always run live.
//!
//! | Piece                         | Role                                         |
//! |-------------------------------|----------------------------------------------|
//! | [`recorder::Recorder`]        | Capability-set proxy, records the action log |
//! | [`response::reduce`]          | Folds the log into a canonical response      |
//! | [`classify::Classifier`]      | Dry run, static vs. dynamic                  |
//! | [`cache::ValidationCache`]    | Replay within window, regenerate otherwise   |
//! | [`registry::Registry`]        | Source ingestion, identity dedup             |
//! | [`dispatch::Dispatcher`]      | Event routing with a failure boundary        |
//! | [`events::EventListeners`]    | Gateway event listeners, log and swallow     |

pub mod action;
pub mod cache;
pub mod classify;
pub mod clock;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod recorder;
pub mod registry;
pub mod reload;
pub mod response;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{Action, ActionKind, DeferOptions, Modal, ModalPayload, ReplyValue, TextInput};
pub use cache::{CacheOutcome, ValidationCache};
pub use classify::{Classification, ClassificationReport, Classifier, DryRun, Staticity};
pub use clock::{Clock, SystemClock};
pub use context::{InteractionContext, RequestField, UserInfo};
pub use dispatch::{DispatchOutcome, Dispatcher, HandlerTable, InboundEvent};
pub use engine::{Engine, EngineOptions};
pub use error::{EngineError, Result};
pub use events::{EmitOutcome, EventListeners, EventName, EventSource, GatewayEvent};
pub use handler::{
    CommandOption, CommandSpec, Handler, HandlerConfig, HandlerSource, OptionKind, Session,
};
pub use recorder::Recorder;
pub use registry::Registry;
pub use reload::{ReloadCoordinator, ReloadGuard};
pub use response::{reduce, CanonicalResponse, Terminal};
pub use store::{CacheEntry, CacheStore, FileStore, MemoryStore};
