use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use serenity::http::Http;
use serenity::model::application::{
    ActionRowComponent, CommandDataOptionValue, CommandInteraction, ComponentInteraction,
    ComponentInteractionDataKind, Interaction, ModalInteraction,
};
use serenity::model::id::{ChannelId, GuildId, InteractionId};
use serenity::model::user::User;
use tracing::trace;

use pregen_core::Category;
use pregen_engine::{
    DeferOptions, EngineError, InboundEvent, InteractionContext, ModalPayload, ReplyValue,
    RequestField, Result,
};

use crate::error::DiscordError;
use crate::payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Command,
    Component,
    ModalSubmit,
}

/// A gateway interaction as the engine sees it: response operations go to
/// Discord's REST API, request data is captured up front.
pub struct LiveInteraction {
    http: Arc<Http>,
    id: InteractionId,
    token: String,
    kind: InteractionKind,
    data: HashMap<String, Value>,
}

impl LiveInteraction {
    fn base(
        http: Arc<Http>,
        id: InteractionId,
        token: &str,
        kind: InteractionKind,
        user: &User,
        channel_id: ChannelId,
        guild_id: Option<GuildId>,
    ) -> Self {
        let mut data = HashMap::new();
        data.insert(
            RequestField::User.to_string(),
            json!({
                "id": user.id.to_string(),
                "name": user.name,
                "display_name": user.global_name,
            }),
        );
        data.insert(
            RequestField::ChannelId.to_string(),
            Value::String(channel_id.to_string()),
        );
        if let Some(guild_id) = guild_id {
            data.insert(
                RequestField::GuildId.to_string(),
                Value::String(guild_id.to_string()),
            );
        }
        Self {
            http,
            id,
            token: token.to_string(),
            kind,
            data,
        }
    }

    pub fn from_command(http: Arc<Http>, command: &CommandInteraction) -> Self {
        let mut live = Self::base(
            http,
            command.id,
            &command.token,
            InteractionKind::Command,
            &command.user,
            command.channel_id,
            command.guild_id,
        );
        for option in &command.data.options {
            live.data.insert(
                RequestField::Option(&option.name).to_string(),
                option_value(&option.value),
            );
        }
        live
    }

    pub fn from_component(http: Arc<Http>, component: &ComponentInteraction) -> Self {
        let mut live = Self::base(
            http,
            component.id,
            &component.token,
            InteractionKind::Component,
            &component.user,
            component.channel_id,
            component.guild_id,
        );
        live.data.insert(
            RequestField::CustomId.to_string(),
            Value::String(component.data.custom_id.clone()),
        );
        let values: Option<Vec<String>> = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => Some(values.clone()),
            ComponentInteractionDataKind::UserSelect { values } => {
                Some(values.iter().map(ToString::to_string).collect())
            }
            ComponentInteractionDataKind::RoleSelect { values } => {
                Some(values.iter().map(ToString::to_string).collect())
            }
            ComponentInteractionDataKind::ChannelSelect { values } => {
                Some(values.iter().map(ToString::to_string).collect())
            }
            _ => None,
        };
        if let Some(values) = values {
            live.data
                .insert(RequestField::Values.to_string(), json!(values));
        }
        live
    }

    pub fn from_modal(http: Arc<Http>, modal: &ModalInteraction) -> Self {
        let mut live = Self::base(
            http,
            modal.id,
            &modal.token,
            InteractionKind::ModalSubmit,
            &modal.user,
            modal.channel_id,
            modal.guild_id,
        );
        live.data.insert(
            RequestField::CustomId.to_string(),
            Value::String(modal.data.custom_id.clone()),
        );
        for row in &modal.data.components {
            for component in &row.components {
                if let ActionRowComponent::InputText(input) = component {
                    live.data.insert(
                        RequestField::Input(&input.custom_id).to_string(),
                        input.value.clone().map(Value::String).unwrap_or(Value::Null),
                    );
                }
            }
        }
        live
    }

    pub fn kind(&self) -> InteractionKind {
        self.kind
    }

    async fn callback(&self, body: Value) -> Result<()> {
        self.http
            .create_interaction_response(self.id, &self.token, &body, Vec::new())
            .await
            .map_err(DiscordError::from)?;
        Ok(())
    }
}

fn option_value(value: &CommandDataOptionValue) -> Value {
    if let Some(s) = value.as_str() {
        return Value::String(s.to_string());
    }
    if let Some(i) = value.as_i64() {
        return Value::from(i);
    }
    if let Some(n) = value.as_f64() {
        return Value::from(n);
    }
    if let Some(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Some(id) = value.as_user_id() {
        return Value::String(id.to_string());
    }
    if let Some(id) = value.as_channel_id() {
        return Value::String(id.to_string());
    }
    if let Some(id) = value.as_role_id() {
        return Value::String(id.to_string());
    }
    if let Some(id) = value.as_attachment_id() {
        return Value::String(id.to_string());
    }
    Value::Null
}

#[async_trait]
impl InteractionContext for LiveInteraction {
    async fn reply(&self, reply: ReplyValue) -> Result<()> {
        self.callback(payload::reply_response(reply)).await
    }

    async fn defer_reply(&self, options: DeferOptions) -> Result<()> {
        self.callback(payload::defer_response(options)).await
    }

    async fn delete_reply(&self) -> Result<()> {
        self.http
            .delete_original_interaction_response(&self.token)
            .await
            .map_err(DiscordError::from)?;
        Ok(())
    }

    async fn edit_reply(&self, reply: ReplyValue) -> Result<()> {
        self.http
            .edit_original_interaction_response(&self.token, &payload::edit_body(reply), Vec::new())
            .await
            .map_err(DiscordError::from)?;
        Ok(())
    }

    async fn follow_up(&self, reply: ReplyValue) -> Result<()> {
        self.http
            .create_followup_message(&self.token, &payload::message_body(reply), Vec::new())
            .await
            .map_err(DiscordError::from)?;
        Ok(())
    }

    async fn show_modal(&self, modal: ModalPayload) -> Result<()> {
        if self.kind == InteractionKind::ModalSubmit {
            return Err(EngineError::Unsupported {
                operation: "showModal",
                reason: "a modal submission cannot be answered with another modal".to_string(),
            });
        }
        self.callback(payload::modal_response(&modal)).await
    }

    fn request(&self, field: RequestField<'_>) -> Result<Value> {
        Ok(self
            .data
            .get(&field.to_string())
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// Translate a gateway interaction into an engine event. Interactions the
/// engine has no category for (autocomplete, pings, unknown components)
/// yield `None`.
pub fn inbound_event(http: &Arc<Http>, interaction: &Interaction) -> Option<InboundEvent> {
    let http = Arc::clone(http);
    let event = match interaction {
        Interaction::Command(command) => InboundEvent::new(
            command.data.name.clone(),
            Category::Command,
            Arc::new(LiveInteraction::from_command(http, command)),
        ),
        Interaction::Component(component) => {
            let category = match component.data.kind {
                ComponentInteractionDataKind::Button => Category::Button,
                ComponentInteractionDataKind::StringSelect { .. }
                | ComponentInteractionDataKind::UserSelect { .. }
                | ComponentInteractionDataKind::RoleSelect { .. }
                | ComponentInteractionDataKind::MentionableSelect { .. }
                | ComponentInteractionDataKind::ChannelSelect { .. } => Category::Select,
                _ => return None,
            };
            InboundEvent::new(
                component.data.custom_id.clone(),
                category,
                Arc::new(LiveInteraction::from_component(http, component)),
            )
        }
        Interaction::Modal(modal) => InboundEvent::new(
            modal.data.custom_id.clone(),
            Category::Modal,
            Arc::new(LiveInteraction::from_modal(http, modal)),
        ),
        _ => {
            trace!("ignoring interaction without a handler category");
            return None;
        }
    };
    Some(event)
}
