use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateCommand, CreateCommandOption};
use serenity::http::Http;
use serenity::model::application::{Command, CommandOptionType};
use serenity::model::id::{ApplicationId, GuildId};
use tracing::info;

use pregen_engine::{CommandSpec, EngineError, OptionKind, Result, Session};

/// REST connection handed to handlers and used for command registration.
pub struct DiscordSession {
    http: Arc<Http>,
    guild_id: Option<GuildId>,
}

impl DiscordSession {
    /// `guild_id` scopes registration to one guild; global otherwise.
    pub fn new(token: &str, client_id: u64, guild_id: Option<u64>) -> Self {
        let http = Http::new(token);
        http.set_application_id(ApplicationId::new(client_id));
        Self {
            http: Arc::new(http),
            guild_id: guild_id.map(GuildId::new),
        }
    }

    pub fn http(&self) -> &Arc<Http> {
        &self.http
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        self.guild_id
    }
}

fn option_type(kind: OptionKind) -> CommandOptionType {
    match kind {
        OptionKind::String => CommandOptionType::String,
        OptionKind::Integer => CommandOptionType::Integer,
        OptionKind::Boolean => CommandOptionType::Boolean,
        OptionKind::User => CommandOptionType::User,
        OptionKind::Channel => CommandOptionType::Channel,
        OptionKind::Role => CommandOptionType::Role,
        OptionKind::Mentionable => CommandOptionType::Mentionable,
        OptionKind::Number => CommandOptionType::Number,
        OptionKind::Attachment => CommandOptionType::Attachment,
    }
}

/// Serenity builder for one command.
pub fn create_command(spec: &CommandSpec) -> CreateCommand {
    spec.options.iter().fold(
        CreateCommand::new(&spec.name).description(&spec.description),
        |command, option| {
            command.add_option(
                CreateCommandOption::new(
                    option_type(option.kind),
                    &option.name,
                    &option.description,
                )
                .required(option.required),
            )
        },
    )
}

#[async_trait]
impl Session for DiscordSession {
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<usize> {
        let builders: Vec<CreateCommand> = commands.iter().map(create_command).collect();

        let registered = match self.guild_id {
            Some(gid) => gid.set_commands(&self.http, builders).await,
            None => Command::set_global_commands(&self.http, builders).await,
        }
        .map_err(|e| EngineError::Registration(e.to_string()))?;

        match self.guild_id {
            Some(gid) => info!(guild = %gid, count = registered.len(), "registered guild slash commands"),
            None => info!(count = registered.len(), "registered global slash commands"),
        }
        Ok(registered.len())
    }
}
