pub mod adapter;
pub mod error;
pub mod handler;
pub mod live;
pub mod payload;
pub mod session;

pub use adapter::DiscordAdapter;
pub use error::DiscordError;
pub use handler::intents_for;
pub use live::{inbound_event, InteractionKind, LiveInteraction};
pub use session::DiscordSession;
