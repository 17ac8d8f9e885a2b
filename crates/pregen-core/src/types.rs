use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The kind of interaction a handler answers.
///
/// Commands are addressed by command name; the three component kinds are
/// addressed by the custom id of the button, select menu or modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Command,
    Button,
    Select,
    Modal,
}

impl Category {
    pub fn is_component(&self) -> bool {
        !matches!(self, Category::Command)
    }

    /// Directory name used for component sources and their cache entries.
    pub fn component_dir(&self) -> Option<&'static str> {
        match self {
            Category::Command => None,
            Category::Button => Some("buttons"),
            Category::Select => Some("selects"),
            Category::Modal => Some("modals"),
        }
    }

    pub fn from_component_dir(dir: &str) -> Option<Self> {
        match dir {
            "buttons" => Some(Category::Button),
            "selects" => Some(Category::Select),
            "modals" => Some(Category::Modal),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Command => write!(f, "command"),
            Category::Button => write!(f, "button"),
            Category::Select => write!(f, "select"),
            Category::Modal => write!(f, "modal"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "command" => Ok(Category::Command),
            "button" => Ok(Category::Button),
            "select" => Ok(Category::Select),
            "modal" => Ok(Category::Modal),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// Identity of a handler: the name is unique within its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerKey {
    pub name: String,
    pub category: Category,
}

impl HandlerKey {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Self::new(name, Category::Command)
    }

    /// Path of this handler's cache entry, relative to the cache root.
    ///
    /// Commands: `commands/{name}.json`
    /// Components: `components/{buttons|selects|modals}/{name}.json`
    pub fn cache_path(&self) -> PathBuf {
        let file = format!("{}.json", self.name);
        match self.category.component_dir() {
            Some(dir) => PathBuf::from("components").join(dir).join(file),
            None => PathBuf::from("commands").join(file),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.category)
    }
}

/// Process mode, selected by CLI subcommand or `PREGEN_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Rebuilds output on every pass, watches sources, stays resident.
    Development,
    /// Serves previously built output; classification still runs but nothing is written.
    Production,
    /// One pass: write output, register commands, exit.
    #[default]
    Build,
}

impl Mode {
    /// Whether static snapshots produced by classification are written to disk.
    pub fn writes_output(&self) -> bool {
        !matches!(self, Mode::Production)
    }

    /// Whether stale output is wiped before each pregeneration pass.
    pub fn clears_output(&self) -> bool {
        matches!(self, Mode::Development)
    }

    /// Whether command metadata is pushed to the platform.
    pub fn registers_commands(&self) -> bool {
        !matches!(self, Mode::Production)
    }

    /// Whether the process keeps running after the first pass.
    pub fn stays_resident(&self) -> bool {
        !matches!(self, Mode::Build)
    }

    pub fn watches_sources(&self) -> bool {
        matches!(self, Mode::Development)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
            Mode::Build => write!(f, "build"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            "build" => Ok(Mode::Build),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_cache_path() {
        let key = HandlerKey::command("greet");
        assert_eq!(key.cache_path(), PathBuf::from("commands/greet.json"));
    }

    #[test]
    fn component_cache_path_uses_category_dir() {
        let key = HandlerKey::new("open-echo", Category::Button);
        assert_eq!(
            key.cache_path(),
            PathBuf::from("components/buttons/open-echo.json")
        );
    }

    #[test]
    fn same_name_different_category_is_distinct() {
        assert_ne!(
            HandlerKey::new("echo", Category::Button),
            HandlerKey::new("echo", Category::Modal)
        );
    }

    #[test]
    fn mode_gates() {
        assert!(Mode::Development.watches_sources());
        assert!(Mode::Development.clears_output());
        assert!(!Mode::Production.writes_output());
        assert!(!Mode::Production.registers_commands());
        assert!(Mode::Build.writes_output());
        assert!(!Mode::Build.stays_resident());
    }

    #[test]
    fn mode_parses_short_names() {
        assert_eq!("dev".parse::<Mode>().unwrap(), Mode::Development);
        assert_eq!("PRODUCTION".parse::<Mode>().unwrap(), Mode::Production);
        assert!("staging".parse::<Mode>().is_err());
    }
}
