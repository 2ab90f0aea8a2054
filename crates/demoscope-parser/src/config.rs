//! Parser configuration, validation, and error types.

use std::error::Error;
use std::fmt;

use demoscope_arena::ArenaConfig;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`ParserConfig::validate()`].
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The first arena block must hold at least one byte.
    ZeroArenaBlock,
    /// The input buffer must hold at least one byte.
    ZeroInputBuffer,
    /// The message length ceiling must be positive.
    InvalidMaxMessageLen {
        /// The configured ceiling.
        value: i32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroArenaBlock => write!(f, "arena_block_size must be at least 1"),
            Self::ZeroInputBuffer => write!(f, "input_buffer must be at least 1"),
            Self::InvalidMaxMessageLen { value } => {
                write!(f, "max_message_len must be positive, got {value}")
            }
        }
    }
}

impl Error for ConfigError {}

// ── ParserConfig ───────────────────────────────────────────────────

/// Tunables for one decode session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserConfig {
    /// Size of the first block of each session arena. Default: 32 KiB.
    pub arena_block_size: u32,
    /// Largest accepted length prefix in bytes. Default: 32 MiB.
    pub max_message_len: i32,
    /// Capacity of the buffered input reader. Default: 32 KiB.
    pub input_buffer: usize,
}

impl ParserConfig {
    /// Default ceiling on a message length prefix.
    pub const DEFAULT_MAX_MESSAGE_LEN: i32 = 1 << 25;

    /// Default input buffer capacity.
    pub const DEFAULT_INPUT_BUFFER: usize = 1 << 15;

    /// Check the configuration for values that would make decoding
    /// impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_block_size == 0 {
            return Err(ConfigError::ZeroArenaBlock);
        }
        if self.input_buffer == 0 {
            return Err(ConfigError::ZeroInputBuffer);
        }
        if self.max_message_len <= 0 {
            return Err(ConfigError::InvalidMaxMessageLen {
                value: self.max_message_len,
            });
        }
        Ok(())
    }

    /// Arena configuration derived from this config.
    pub fn arena(&self) -> ArenaConfig {
        ArenaConfig::new(self.arena_block_size)
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            arena_block_size: ArenaConfig::DEFAULT_FIRST_BLOCK_SIZE,
            max_message_len: Self::DEFAULT_MAX_MESSAGE_LEN,
            input_buffer: Self::DEFAULT_INPUT_BUFFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ParserConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_message_len, 33_554_432);
        assert_eq!(config.arena().first_block_size, 1 << 15);
    }

    #[test]
    fn zero_sizes_rejected() {
        let config = ParserConfig {
            arena_block_size: 0,
            ..ParserConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroArenaBlock));

        let config = ParserConfig {
            input_buffer: 0,
            ..ParserConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInputBuffer));
    }

    #[test]
    fn negative_ceiling_rejected() {
        let config = ParserConfig {
            max_message_len: -1,
            ..ParserConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "max_message_len must be positive, got -1");
    }
}
