//! The bot's handlers.
//!
//! Locations follow the on-disk convention the registry expects:
//! `commands/<name>` and `components/<buttons|selects|modals>/<name>`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use pregen_discord::DiscordSession;
use pregen_engine::{
    CommandOption, DeferOptions, EventSource, GatewayEvent, HandlerConfig, HandlerSource,
    InteractionContext, Modal, OptionKind, ReplyValue, TextInput,
};
use tracing::info;

const ABOUT_FILE: &str = "about.md";

type Ctx = Arc<dyn InteractionContext>;
type Source = HandlerSource<DiscordSession>;

pub fn sources() -> Vec<Source> {
    vec![
        static_command(),
        about_command(),
        dynamic_command(),
        menu_command(),
        echo_command(),
        open_echo_button(),
        pick_color_select(),
        echo_modal(),
    ]
}

pub fn events() -> Vec<EventSource<DiscordSession>> {
    vec![ready_listener(), member_join_listener()]
}

fn ready_listener() -> EventSource<DiscordSession> {
    EventSource::new(
        "events/ClientReady.rs",
        |_session: Arc<DiscordSession>, event: GatewayEvent| async move {
            let guilds = event.payload["guilds"].as_array().map_or(0, Vec::len);
            info!(guilds, "ready to serve");
            anyhow::Ok(())
        },
    )
}

fn member_join_listener() -> EventSource<DiscordSession> {
    EventSource::new(
        "events/GuildMemberAdd.rs",
        |_session: Arc<DiscordSession>, event: GatewayEvent| async move {
            let name = event.payload["user"]["username"].as_str().unwrap_or("someone");
            info!(name, "member joined");
            anyhow::Ok(())
        },
    )
}

/// Pregenerated once, then replayed until the window runs out.
fn static_command() -> Source {
    HandlerSource::new(
        "commands/static.rs",
        HandlerConfig::new()
            .description("A pregenerated response")
            .pregenerated(true)
            .revalidate(60),
        |ctx: Ctx, _session| async move {
            ctx.defer_reply(DeferOptions::ephemeral()).await?;
            let generated = Utc::now().format("%H:%M:%S UTC").to_string();
            ctx.edit_reply(format!("This response was generated at {generated}.").into())
                .await?;
            ctx.follow_up(ReplyValue::ephemeral(
                "Run it again within a minute and the same response is replayed.",
            ))
            .await?;
            anyhow::Ok(())
        },
    )
}

/// Served from `about.md` in the working directory. In development the
/// watcher refreshes the snapshot whenever the file changes.
fn about_command() -> Source {
    HandlerSource::new(
        "commands/about.rs",
        HandlerConfig::new()
            .description("About this bot")
            .pregenerated(true),
        |ctx: Ctx, _session| async move {
            let text = match tokio::fs::read_to_string(ABOUT_FILE).await {
                Ok(text) if !text.trim().is_empty() => text,
                _ => "A bot that pregenerates its static responses.".to_string(),
            };
            ctx.reply(ReplyValue::ephemeral(text)).await?;
            anyhow::Ok(())
        },
    )
}

fn dynamic_command() -> Source {
    HandlerSource::new(
        "commands/dynamic.rs",
        HandlerConfig::new().description("A response generated for you"),
        |ctx: Ctx, _session| async move {
            let user = ctx.user()?;
            let now = Utc::now().format("%H:%M:%S UTC").to_string();
            ctx.reply(format!("Hello {}, it is {now}.", user.display()).into())
                .await?;
            anyhow::Ok(())
        },
    )
}

fn menu_command() -> Source {
    HandlerSource::new(
        "commands/menu.rs",
        HandlerConfig::new().description("Show the demo components"),
        |ctx: Ctx, _session| async move {
            let message = json!({
                "content": "Pick something:",
                "components": [
                    {
                        "type": 1,
                        "components": [
                            { "type": 2, "style": 1, "label": "Echo", "custom_id": "open-echo" }
                        ]
                    },
                    {
                        "type": 1,
                        "components": [{
                            "type": 3,
                            "custom_id": "pick-color",
                            "placeholder": "Favourite color",
                            "options": [
                                { "label": "Red", "value": "red" },
                                { "label": "Green", "value": "green" },
                                { "label": "Blue", "value": "blue" }
                            ]
                        }]
                    }
                ]
            });
            ctx.reply(ReplyValue::from_json(message)).await?;
            anyhow::Ok(())
        },
    )
}

/// Reads an option, so it always runs live.
fn echo_command() -> Source {
    HandlerSource::new(
        "commands/echo.rs",
        HandlerConfig::new()
            .description("Repeat a message")
            .option(CommandOption::new(OptionKind::String, "text", "What to repeat").required(true)),
        |ctx: Ctx, _session| async move {
            let text = ctx.option_str("text")?.unwrap_or_default();
            ctx.reply(text.into()).await?;
            anyhow::Ok(())
        },
    )
}

fn echo_modal_form() -> Modal {
    Modal::new("echo-modal", "Echo").input(
        TextInput::paragraph("echo", "What should I repeat?").placeholder("Anything at all"),
    )
}

/// The modal never changes, so the button is static.
fn open_echo_button() -> Source {
    HandlerSource::new(
        "components/buttons/open-echo.rs",
        HandlerConfig::new(),
        |ctx: Ctx, _session| async move {
            ctx.show_modal(echo_modal_form().into()).await?;
            anyhow::Ok(())
        },
    )
}

fn pick_color_select() -> Source {
    HandlerSource::new(
        "components/selects/pick-color.rs",
        HandlerConfig::new(),
        |ctx: Ctx, _session| async move {
            let picked = ctx.values()?.join(", ");
            ctx.reply(ReplyValue::ephemeral(format!("You picked {picked}.")))
                .await?;
            anyhow::Ok(())
        },
    )
}

fn echo_modal() -> Source {
    HandlerSource::new(
        "components/modals/echo-modal.rs",
        HandlerConfig::new(),
        |ctx: Ctx, _session| async move {
            let text = ctx.input("echo")?.unwrap_or_default();
            ctx.reply(ReplyValue::ephemeral(format!("You said: {text}")))
                .await?;
            anyhow::Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregen_core::{Category, HandlerKey};
    use pregen_engine::registry::parse_location;
    use pregen_engine::testing::ScriptedInteraction;
    use pregen_engine::{Action, EventName};

    #[test]
    fn every_source_has_a_category() {
        let keys: Vec<HandlerKey> = sources()
            .iter()
            .filter_map(|s| parse_location(&s.location))
            .collect();
        assert_eq!(keys.len(), sources().len());
        assert!(keys.contains(&HandlerKey::new("open-echo", Category::Button)));
        assert!(keys.contains(&HandlerKey::new("echo-modal", Category::Modal)));
    }

    fn session() -> Arc<DiscordSession> {
        Arc::new(DiscordSession::new("token", 1, None))
    }

    #[tokio::test]
    async fn echo_repeats_the_option() {
        let live = Arc::new(ScriptedInteraction::new().with_option("text", "hello"));
        let ctx: Ctx = live.clone();
        (echo_command().body)(ctx, session()).await.unwrap();
        assert_eq!(live.calls(), vec![Action::Reply("hello".into())]);
    }

    #[tokio::test]
    async fn modal_echo_is_ephemeral() {
        let live = Arc::new(ScriptedInteraction::new().with_input("echo", "hi there"));
        let ctx: Ctx = live.clone();
        (echo_modal().body)(ctx, session()).await.unwrap();
        assert_eq!(
            live.calls(),
            vec![Action::Reply(ReplyValue::ephemeral("You said: hi there"))]
        );
    }

    #[tokio::test]
    async fn open_echo_shows_the_modal() {
        let live = Arc::new(ScriptedInteraction::new());
        let ctx: Ctx = live.clone();
        (open_echo_button().body)(ctx, session()).await.unwrap();
        assert_eq!(live.calls(), vec![Action::ShowModal(echo_modal_form().into())]);
    }

    #[test]
    fn every_listener_names_an_event() {
        let names: Vec<_> = events()
            .iter()
            .filter_map(|e| pregen_engine::events::parse_event_location(&e.location))
            .collect();
        assert_eq!(
            names,
            vec![EventName::ClientReady, EventName::GuildMemberAdd]
        );
    }

    #[tokio::test]
    async fn member_join_listener_tolerates_sparse_payloads() {
        let event = GatewayEvent::new(EventName::GuildMemberAdd, serde_json::json!({}));
        (member_join_listener().body)(session(), event).await.unwrap();
    }

    #[test]
    fn button_opens_the_modal_the_modal_handler_answers() {
        let payload: pregen_engine::ModalPayload = echo_modal_form().into();
        assert_eq!(payload.custom_id(), Some("echo-modal"));
    }
}
