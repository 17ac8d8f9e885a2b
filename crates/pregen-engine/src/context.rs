use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::action::{DeferOptions, ModalPayload, ReplyValue};
use crate::error::Result;

/// Request-specific data a handler may read from an interaction.
///
/// Reading any of these marks a handler dynamic during its dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestField<'a> {
    /// The invoking user (`{ id, name, display_name }`).
    User,
    ChannelId,
    GuildId,
    /// Custom id of the button, select menu or modal.
    CustomId,
    /// A command option by name.
    Option(&'a str),
    /// Selected values of a select menu.
    Values,
    /// A modal text input by custom id.
    Input(&'a str),
}

impl fmt::Display for RequestField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestField::User => write!(f, "user"),
            RequestField::ChannelId => write!(f, "channel_id"),
            RequestField::GuildId => write!(f, "guild_id"),
            RequestField::CustomId => write!(f, "custom_id"),
            RequestField::Option(name) => write!(f, "option:{name}"),
            RequestField::Values => write!(f, "values"),
            RequestField::Input(id) => write!(f, "input:{id}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserInfo {
    /// Display name when set, account name otherwise.
    pub fn display(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// The surface a handler sees: six response operations plus request data.
///
/// Live interactions implement it against the platform; [`crate::Recorder`]
/// implements it by logging every response call and guarding request data.
#[async_trait]
pub trait InteractionContext: Send + Sync {
    async fn reply(&self, reply: ReplyValue) -> Result<()>;

    async fn defer_reply(&self, options: DeferOptions) -> Result<()>;

    async fn delete_reply(&self) -> Result<()>;

    async fn edit_reply(&self, reply: ReplyValue) -> Result<()>;

    async fn follow_up(&self, reply: ReplyValue) -> Result<()>;

    async fn show_modal(&self, modal: ModalPayload) -> Result<()>;

    /// Read request-specific data. Absent data is JSON `null`.
    fn request(&self, field: RequestField<'_>) -> Result<Value>;

    fn user(&self) -> Result<UserInfo> {
        let value = self.request(RequestField::User)?;
        if value.is_null() {
            return Ok(UserInfo::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    fn option(&self, name: &str) -> Result<Value> {
        self.request(RequestField::Option(name))
    }

    fn option_str(&self, name: &str) -> Result<Option<String>> {
        Ok(self.option(name)?.as_str().map(str::to_string))
    }

    fn input(&self, custom_id: &str) -> Result<Option<String>> {
        Ok(self
            .request(RequestField::Input(custom_id))?
            .as_str()
            .map(str::to_string))
    }

    fn values(&self) -> Result<Vec<String>> {
        let value = self.request(RequestField::Values)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value)?)
    }

    fn custom_id(&self) -> Result<Option<String>> {
        Ok(self
            .request(RequestField::CustomId)?
            .as_str()
            .map(str::to_string))
    }
}
