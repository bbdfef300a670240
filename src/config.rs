//! Search and lowering configuration.
//!
//! One explicit record replaces the module-level constants a generator
//! would otherwise hard-code. It is validated before any synthesis or
//! lowering starts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::ShapeState;
use crate::lower::{BufferPlan, BufferPolicy};
use crate::synth::MAX_CHANNELS;

/// Default feature-buffer capacity: a 32x32 map with 128 channels.
pub const DEFAULT_CAPACITY: usize = 32 * 32 * 128;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Depth budget; the stem draws between 2 and `max_depth - 3` blocks.
    pub max_depth: usize,
    pub input_channels: usize,
    /// Height and width of the (square) input image.
    pub input_size: usize,
    /// Elements per feature buffer, rendered as `MAX_FEAT_SIZE`.
    pub capacity: usize,
    /// Width of the terminal linear layer.
    pub classifier_width: usize,
    pub buffer_policy: BufferPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 8,
            input_channels: 3,
            input_size: 32,
            capacity: DEFAULT_CAPACITY,
            classifier_width: 128,
            buffer_policy: BufferPolicy::PingPong,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth < 3 {
            return Err(ConfigError::invalid("max_depth", "must be at least 3"));
        }
        for (field, value) in [
            ("input_channels", self.input_channels),
            ("input_size", self.input_size),
            ("capacity", self.capacity),
            ("classifier_width", self.classifier_width),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        // Every feature map the synthesizer can reach must have a countable
        // element total, including the widest conv output at full size.
        let widest = self.input_channels.max(MAX_CHANNELS);
        let elements = widest
            .checked_mul(self.input_size)
            .and_then(|n| n.checked_mul(self.input_size));
        if elements.is_none() {
            return Err(ConfigError::invalid(
                "input_size",
                "is too large: the feature map element count overflows",
            ));
        }
        Ok(())
    }

    /// Shape of the network input: `input_channels x input_size x input_size`.
    pub fn initial_shape(&self) -> ShapeState {
        ShapeState::image(self.input_channels, self.input_size, self.input_size)
    }

    pub fn buffer_plan(&self) -> BufferPlan {
        BufferPlan::new(self.capacity, self.buffer_policy)
    }
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { field: &'static str, reason: String },
    Parse(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &str) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid config: {} {}", field, reason)
            }
            ConfigError::Parse(msg) => write!(f, "cannot parse config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
