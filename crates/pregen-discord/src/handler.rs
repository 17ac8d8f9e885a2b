use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use serenity::async_trait;
use serenity::model::application::Interaction;
use serenity::model::channel::Message;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::guild::{Guild, Member, UnavailableGuild};
use serenity::model::id::GuildId;
use serenity::model::user::User;
use serenity::prelude::{Context, EventHandler};
use tracing::info;

use pregen_engine::{Dispatcher, EventListeners, EventName, GatewayEvent};

use crate::live::inbound_event;
use crate::session::DiscordSession;

/// Serenity event handler feeding interactions to the dispatcher and gateway
/// events to their listeners.
pub struct PregenHandler {
    pub dispatcher: Arc<Dispatcher<DiscordSession>>,
    pub listeners: Arc<EventListeners<DiscordSession>>,
}

impl PregenHandler {
    fn emit(&self, name: EventName, payload: Value) {
        if !self.listeners.events().contains(&name) {
            return;
        }
        let listeners = Arc::clone(&self.listeners);
        tokio::spawn(async move {
            listeners.emit(GatewayEvent::new(name, payload)).await;
        });
    }
}

fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Gateway intents needed to receive `events`, on top of `GUILDS`.
///
/// Member events need the privileged members intent enabled for the
/// application. Message events arrive without content unless the message
/// content intent is granted as well.
pub fn intents_for(events: &[EventName]) -> GatewayIntents {
    events
        .iter()
        .fold(GatewayIntents::GUILDS, |intents, event| match event {
            EventName::ClientReady | EventName::GuildCreate | EventName::GuildDelete => intents,
            EventName::GuildMemberAdd | EventName::GuildMemberRemove => {
                intents | GatewayIntents::GUILD_MEMBERS
            }
            EventName::MessageCreate => {
                intents | GatewayIntents::GUILD_MESSAGES | GatewayIntents::DIRECT_MESSAGES
            }
        })
}

#[async_trait]
impl EventHandler for PregenHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(name = %ready.user.name, "Discord bot connected");
        self.emit(EventName::ClientReady, to_payload(&ready));
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        self.emit(EventName::GuildCreate, to_payload(&guild));
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        self.emit(EventName::GuildDelete, to_payload(&incomplete));
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        self.emit(EventName::GuildMemberAdd, to_payload(&member));
    }

    async fn guild_member_removal(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        user: User,
        _member: Option<Member>,
    ) {
        let mut payload = Map::new();
        payload.insert("guild_id".into(), Value::String(guild_id.to_string()));
        payload.insert("user".into(), to_payload(&user));
        self.emit(EventName::GuildMemberRemove, Value::Object(payload));
    }

    async fn message(&self, _ctx: Context, message: Message) {
        if message.author.bot {
            return;
        }
        self.emit(EventName::MessageCreate, to_payload(&message));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(event) = inbound_event(&ctx.http, &interaction) else {
            return;
        };

        // Each event on its own task so a slow handler never holds up the gateway.
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            dispatcher.dispatch(event).await;
        });
    }
}
