use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use pregen_core::{Category, HandlerKey};

use crate::context::InteractionContext;
use crate::error::Result;

pub const DEFAULT_DESCRIPTION: &str = "No description provided";

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A handler body: `(context, session) -> future<result>`.
pub type HandlerBody<S> =
    Arc<dyn Fn(Arc<dyn InteractionContext>, Arc<S>) -> HandlerFuture + Send + Sync>;

/// The platform connection handlers receive and commands are registered with.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Replace the platform's command list with `commands`.
    /// Returns how many commands the platform accepted.
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

/// A command option as declared by the handler source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOption {
    pub kind: OptionKind,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl CommandOption {
    pub fn new(kind: OptionKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// Metadata pushed to the platform for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOption>,
}

/// Per-handler configuration exported next to the body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Commands only.
    pub description: Option<String>,
    /// Commands only.
    #[serde(default)]
    pub options: Vec<CommandOption>,
    /// Revalidation window in seconds; overrides the configured default.
    pub revalidate: Option<u64>,
    /// Explicit staticity: `true` forces static, `false` forces dynamic.
    pub pregenerated: Option<bool>,
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn revalidate(mut self, seconds: u64) -> Self {
        self.revalidate = Some(seconds);
        self
    }

    pub fn pregenerated(mut self, pregenerated: bool) -> Self {
        self.pregenerated = Some(pregenerated);
        self
    }
}

fn box_body<S, F, Fut>(body: F) -> HandlerBody<S>
where
    S: Session,
    F: Fn(Arc<dyn InteractionContext>, Arc<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx: Arc<dyn InteractionContext>, session: Arc<S>| {
        Box::pin(body(ctx, session)) as HandlerFuture
    })
}

/// Await a handler future, turning a panic into an error.
pub(crate) async fn run_guarded(fut: HandlerFuture) -> anyhow::Result<()> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A handler as declared: where it lives, its config, and its body.
///
/// The registry derives identity from `location`:
/// `commands/<...>/<name>` or `components/<buttons|selects|modals>/<...>/<name>`.
pub struct HandlerSource<S: Session> {
    pub location: String,
    pub config: HandlerConfig,
    pub body: HandlerBody<S>,
}

impl<S: Session> HandlerSource<S> {
    pub fn new<F, Fut>(location: impl Into<String>, config: HandlerConfig, body: F) -> Self
    where
        F: Fn(Arc<dyn InteractionContext>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            location: location.into(),
            config,
            body: box_body(body),
        }
    }
}

impl<S: Session> Clone for HandlerSource<S> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            config: self.config.clone(),
            body: Arc::clone(&self.body),
        }
    }
}

impl<S: Session> fmt::Debug for HandlerSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSource")
            .field("location", &self.location)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A discovered handler. Immutable once built.
pub struct Handler<S: Session> {
    key: HandlerKey,
    config: HandlerConfig,
    body: HandlerBody<S>,
}

impl<S: Session> Handler<S> {
    pub fn new<F, Fut>(key: HandlerKey, config: HandlerConfig, body: F) -> Self
    where
        F: Fn(Arc<dyn InteractionContext>, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_parts(key, config, box_body(body))
    }

    pub fn from_parts(key: HandlerKey, mut config: HandlerConfig, body: HandlerBody<S>) -> Self {
        if key.category == Category::Command && config.description.is_none() {
            config.description = Some(DEFAULT_DESCRIPTION.to_string());
        }
        Self { key, config, body }
    }

    pub fn key(&self) -> &HandlerKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn category(&self) -> Category {
        self.key.category
    }

    /// The explicit staticity override, if any.
    pub fn hint(&self) -> Option<bool> {
        self.config.pregenerated
    }

    pub fn revalidate(&self) -> Option<u64> {
        self.config.revalidate
    }

    /// Effective revalidation window: the handler's own, else `default_secs`.
    pub fn window_secs(&self, default_secs: u64) -> u64 {
        self.config.revalidate.unwrap_or(default_secs)
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Registration metadata; `None` for components.
    pub fn command_spec(&self) -> Option<CommandSpec> {
        if self.key.category != Category::Command {
            return None;
        }
        Some(CommandSpec {
            name: self.key.name.clone(),
            description: self
                .config
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            options: self.config.options.clone(),
        })
    }

    /// Start the body. Nothing runs until the returned future is polled.
    pub fn invoke(&self, ctx: Arc<dyn InteractionContext>, session: Arc<S>) -> HandlerFuture {
        (self.body)(ctx, session)
    }
}

impl<S: Session> fmt::Debug for Handler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
