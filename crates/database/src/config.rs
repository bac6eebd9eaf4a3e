//! Database configuration.

use crate::join::JoinMode;

/// Settings fixed when a database is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Name used in log output.
    pub name: String,
    /// Join mode used by queries that do not pick one.
    pub join_mode: JoinMode,
}

impl DatabaseConfig {
    /// Creates a configuration with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            join_mode: JoinMode::default(),
        }
    }

    /// Sets the default join mode.
    pub fn join_mode(mut self, mode: JoinMode) -> Self {
        self.join_mode = mode;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("lumen")
    }
}
