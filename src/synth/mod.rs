//! Topology synthesis: random architectures that are valid by construction.
//!
//! Every candidate is built in three fixed phases and every block is pushed
//! through the shape engine as it is appended, so parameters are always
//! chosen against the real incoming shape. Nothing is retried or discarded.
//!
//! 1. Stem (2-D): conv / relu / max_pool drawn with weights 2 : 1 : 1.
//! 2. Transition: `global_avg_pool` then `flatten`, always.
//! 3. Classifier (1-D): one or two linear layers, relu between them,
//!    the last one fixed to `classifier_width`.


use std::fmt;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Config, ConfigError};
use crate::ir::{
    propagate, Architecture, IrError, OperatorBlock, Padding, ShapeError, ShapeState,
};

/// Shortest stem the synthesizer emits.
pub const MIN_STEM: usize = 2;
/// Upper bound on conv output channels.
pub const MAX_CHANNELS: usize = 128;
/// Spatial size at or below which pooling and strided convs are skipped.
pub const SMALL_SPATIAL: usize = 4;

const KERNEL_SIZES: [usize; 2] = [3, 5];
const CHANNEL_MULTIPLIERS: [usize; 3] = [1, 2, 4];
const HIDDEN_WIDTHS: [usize; 3] = [128, 256, 512];
const POOL_KERNEL: usize = 2;
const POOL_STRIDE: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StemOp {
    Conv,
    Relu,
    MaxPool,
}

const STEM_WEIGHTS: [(StemOp, u32); 3] = [
    (StemOp::Conv, 2),
    (StemOp::Relu, 1),
    (StemOp::MaxPool, 1),
];

// ─── Results and errors ───────────────────────────────────────────

/// A synthesized architecture together with the output width recorded
/// while its classifier was built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub architecture: Architecture,
    pub output_features: usize,
}

/// Synthesis failed. Any of these indicates an internal inconsistency in
/// the synthesizer itself; valid configurations never produce them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SynthError {
    Shape(ShapeError),
    Ir(IrError),
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthError::Shape(e) => write!(f, "synthesizer produced an invalid shape: {}", e),
            SynthError::Ir(e) => write!(f, "synthesizer produced an invalid block: {}", e),
        }
    }
}

impl std::error::Error for SynthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SynthError::Shape(e) => Some(e),
            SynthError::Ir(e) => Some(e),
        }
    }
}

impl From<ShapeError> for SynthError {
    fn from(e: ShapeError) -> Self {
        SynthError::Shape(e)
    }
}

impl From<IrError> for SynthError {
    fn from(e: IrError) -> Self {
        SynthError::Ir(e)
    }
}

// ─── Builder ──────────────────────────────────────────────────────

/// Blocks appended so far plus the shape they produce.
struct Builder {
    blocks: Vec<OperatorBlock>,
    shape: ShapeState,
}

impl Builder {
    fn push(&mut self, block: OperatorBlock) -> Result<(), ShapeError> {
        let next = propagate(self.shape, &block)?;
        debug!("block {}: {} -> {}", self.blocks.len(), block, next);
        self.blocks.push(block);
        self.shape = next;
        Ok(())
    }

    fn last_is_relu(&self) -> bool {
        matches!(self.blocks.last(), Some(OperatorBlock::Relu))
    }

    /// `(channels, min(height, width))` of the current feature map.
    fn feature_map(&self, op: &'static str) -> Result<(usize, usize), ShapeError> {
        match self.shape {
            ShapeState::TwoD {
                channels,
                height,
                width,
            } => Ok((channels, height.min(width))),
            ShapeState::OneD { .. } => Err(ShapeError::ModeMismatch {
                op,
                found: self.shape.mode(),
            }),
        }
    }
}

// ─── Synthesizer ──────────────────────────────────────────────────

/// Draws architectures from the search space. All randomness comes from
/// the injected `rng`, so a seeded generator reproduces every candidate.
pub struct Synthesizer<R: Rng> {
    config: Config,
    rng: R,
}

impl Synthesizer<StdRng> {
    pub fn seeded(config: Config, seed: u64) -> Result<Self, ConfigError> {
        Self::new(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Synthesizer<R> {
    pub fn new(config: Config, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn synthesize(&mut self) -> Result<Candidate, SynthError> {
        let mut builder = Builder {
            blocks: Vec::new(),
            shape: self.config.initial_shape(),
        };
        self.stem(&mut builder)?;
        self.transition(&mut builder)?;
        let output_features = self.classifier(&mut builder)?;
        let architecture = Architecture::new(builder.blocks)?;
        Ok(Candidate {
            architecture,
            output_features,
        })
    }

    fn stem(&mut self, b: &mut Builder) -> Result<(), SynthError> {
        let upper = self.config.max_depth.saturating_sub(3).max(MIN_STEM);
        let steps = self.rng.random_range(MIN_STEM..=upper);
        for _ in 0..steps {
            let (channels, size) = b.feature_map("stem")?;
            match self.draw_stem_op() {
                StemOp::Relu if b.last_is_relu() => continue,
                StemOp::MaxPool if size <= SMALL_SPATIAL => continue,
                StemOp::Relu => b.push(OperatorBlock::Relu)?,
                StemOp::MaxPool => b.push(OperatorBlock::max_pool(POOL_KERNEL, POOL_STRIDE)?)?,
                StemOp::Conv => {
                    let conv = self.draw_conv(channels, size)?;
                    b.push(conv)?;
                }
            }
        }
        Ok(())
    }

    fn draw_stem_op(&mut self) -> StemOp {
        let total: u32 = STEM_WEIGHTS.iter().map(|(_, w)| w).sum();
        let mut pick = self.rng.random_range(0..total);
        for (op, weight) in STEM_WEIGHTS {
            if pick < weight {
                return op;
            }
            pick -= weight;
        }
        StemOp::Conv
    }

    fn draw_conv(&mut self, channels: usize, size: usize) -> Result<OperatorBlock, IrError> {
        let kernel = KERNEL_SIZES[self.rng.random_range(0..KERNEL_SIZES.len())];
        let multiplier = CHANNEL_MULTIPLIERS[self.rng.random_range(0..CHANNEL_MULTIPLIERS.len())];
        let out_channels = channels.saturating_mul(multiplier).min(MAX_CHANNELS);
        let stride = if size <= SMALL_SPATIAL {
            1
        } else {
            self.rng.random_range(1..=2)
        };
        let padding = if stride == 1 {
            Padding::Same
        } else {
            Padding::Explicit(kernel / 2)
        };
        OperatorBlock::conv(channels, out_channels, kernel, padding, stride)
    }

    fn transition(&mut self, b: &mut Builder) -> Result<(), SynthError> {
        b.push(OperatorBlock::GlobalAvgPool)?;
        let in_features = b.shape.elements();
        b.push(OperatorBlock::flatten(in_features)?)?;
        Ok(())
    }

    /// Returns the width of the final linear layer.
    fn classifier(&mut self, b: &mut Builder) -> Result<usize, SynthError> {
        let layers = self.rng.random_range(1..=2usize);
        for layer in 0..layers {
            if layer > 0 {
                b.push(OperatorBlock::Relu)?;
            }
            let out_features = if layer + 1 == layers {
                self.config.classifier_width
            } else {
                HIDDEN_WIDTHS[self.rng.random_range(0..HIDDEN_WIDTHS.len())]
            };
            let in_features = b.shape.elements();
            b.push(OperatorBlock::linear(in_features, out_features)?)?;
        }
        match b.shape {
            ShapeState::OneD { features } => Ok(features),
            ShapeState::TwoD { .. } => Err(SynthError::Shape(ShapeError::ModeMismatch {
                op: "linear",
                found: b.shape.mode(),
            })),
        }
    }
}
