//! Configuration for the ledger

use serde::{Deserialize, Serialize};

/// Highest accepted proof-of-work difficulty.
///
/// Each extra hex digit multiplies the expected sealing work by 16.
pub const MAX_DIFFICULTY: u32 = 6;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of leading `'0'` hex characters every block hash must carry
    pub difficulty: u32,

    /// Bounded capacity of the append actor's mailbox
    pub mailbox_capacity: usize,

    /// Description stored in the genesis transaction
    pub genesis_description: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            difficulty: 2,
            mailbox_capacity: 1024,
            genesis_description: "Genesis block".to_string(),
        }
    }
}

impl Config {
    /// Config with the given difficulty and defaults elsewhere
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(difficulty) = std::env::var("LEDGER_DIFFICULTY") {
            config.difficulty = difficulty
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_DIFFICULTY: {}", e)))?;
        }

        if let Ok(capacity) = std::env::var("LEDGER_MAILBOX_CAPACITY") {
            config.mailbox_capacity = capacity
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_MAILBOX_CAPACITY: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check bounds
    pub fn validate(&self) -> crate::Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(crate::Error::Config(format!(
                "difficulty {} exceeds maximum {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
