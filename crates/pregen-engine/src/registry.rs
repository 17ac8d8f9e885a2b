use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use pregen_core::{Category, HandlerKey};

use crate::handler::{CommandSpec, Handler, HandlerSource, Session};

/// Derive a handler's identity from its declared location.
///
/// `commands/<...>/<name>` is a command; `components/<buttons|selects|modals>/<...>/<name>`
/// is a component of that kind. The name is the last segment without its
/// extension. Anything else has no category and yields `None`.
pub fn parse_location(location: &str) -> Option<HandlerKey> {
    let segments: Vec<&str> = location
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let root = segments
        .iter()
        .position(|s| *s == "commands" || *s == "components")?;
    let rest = &segments[root + 1..];

    let (category, path) = if segments[root] == "commands" {
        (Category::Command, rest)
    } else {
        let (dir, path) = rest.split_first()?;
        (Category::from_component_dir(dir)?, path)
    };

    let file = path.last()?;
    let name = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    Some(HandlerKey::new(name, category))
}

/// Discovered handlers, unique by identity, in discovery order.
pub struct Registry<S: Session> {
    handlers: Vec<Arc<Handler<S>>>,
    index: HashMap<HandlerKey, usize>,
}

impl<S: Session> Default for Registry<S> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<S: Session> Registry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn discover(sources: impl IntoIterator<Item = HandlerSource<S>>) -> Self {
        let mut registry = Self::new();
        for source in sources {
            registry.ingest(source);
        }
        debug!(count = registry.len(), "handlers discovered");
        registry
    }

    /// Add one source. Returns `false` when it was skipped.
    pub fn ingest(&mut self, source: HandlerSource<S>) -> bool {
        let Some(key) = parse_location(&source.location) else {
            warn!(location = %source.location, "cannot determine handler category, skipping");
            return false;
        };
        self.insert(Handler::from_parts(key, source.config, source.body))
    }

    /// Add a handler unless its identity is taken; the first one wins.
    pub fn insert(&mut self, handler: Handler<S>) -> bool {
        let key = handler.key().clone();
        if self.index.contains_key(&key) {
            warn!(
                name = %key.name,
                category = %key.category,
                "duplicate handler identity, keeping the first"
            );
            return false;
        }
        self.index.insert(key, self.handlers.len());
        self.handlers.push(Arc::new(handler));
        true
    }

    pub fn get(&self, key: &HandlerKey) -> Option<&Arc<Handler<S>>> {
        self.index.get(key).map(|&i| &self.handlers[i])
    }

    pub fn handlers(&self) -> &[Arc<Handler<S>>] {
        &self.handlers
    }

    /// Metadata for every command, in discovery order.
    pub fn command_specs(&self) -> Vec<CommandSpec> {
        self.handlers
            .iter()
            .filter_map(|h| h.command_spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
