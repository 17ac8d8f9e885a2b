use std::sync::Arc;
use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::Client;
use tracing::{error, info, warn};

use pregen_engine::{Dispatcher, EventListeners};

use crate::error::DiscordError;
use crate::handler::{intents_for, PregenHandler};
use crate::session::DiscordSession;

/// Gateway connection for the bot.
///
/// Wraps a serenity `Client` and keeps it connected for the lifetime of the
/// process, rebuilding it whenever the gateway drops.
pub struct DiscordAdapter {
    token: String,
    dispatcher: Arc<Dispatcher<DiscordSession>>,
    listeners: Arc<EventListeners<DiscordSession>>,
}

impl DiscordAdapter {
    pub fn new(
        token: &str,
        dispatcher: Arc<Dispatcher<DiscordSession>>,
        listeners: Arc<EventListeners<DiscordSession>>,
    ) -> Result<Self, DiscordError> {
        if token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        Ok(Self {
            token: token.to_string(),
            dispatcher,
            listeners,
        })
    }

    /// Connect and keep reconnecting. Never returns.
    pub async fn run(self) {
        // Interactions arrive regardless of intents; listeners may need more.
        let intents = intents_for(&self.listeners.events());
        info!(?intents, "Discord: gateway intents");

        loop {
            let mut client = loop {
                match self.build_client(intents).await {
                    Ok(c) => break c,
                    Err(e) => {
                        error!("Discord: connect failed ({e}), retrying in 30s");
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            };

            info!("Discord: gateway connecting");
            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn build_client(&self, intents: GatewayIntents) -> Result<Client, DiscordError> {
        let handler = PregenHandler {
            dispatcher: Arc::clone(&self.dispatcher),
            listeners: Arc::clone(&self.listeners),
        };
        Ok(Client::builder(&self.token, intents)
            .event_handler(handler)
            .await?)
    }
}
