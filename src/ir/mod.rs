//! Operator intermediate representation for candidate topologies.
//!
//! An `Architecture` is an ordered list of `OperatorBlock`s. Each block
//! carries only its own parameters, validated when the block is built.
//! Shapes are never stored on blocks: whoever needs them replays
//! [`shape::propagate`] from an initial shape.

mod json;
pub mod shape;
#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use shape::{propagate, Mode, ShapeError, ShapeState};

// ─── Operator kinds ───────────────────────────────────────────────

/// The closed set of operators the search space draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Conv,
    Relu,
    MaxPool,
    GlobalAvgPool,
    Flatten,
    Linear,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 6] = [
        OperatorKind::Conv,
        OperatorKind::Relu,
        OperatorKind::MaxPool,
        OperatorKind::GlobalAvgPool,
        OperatorKind::Flatten,
        OperatorKind::Linear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperatorKind::Conv => "conv",
            OperatorKind::Relu => "relu",
            OperatorKind::MaxPool => "max_pool",
            OperatorKind::GlobalAvgPool => "global_avg_pool",
            OperatorKind::Flatten => "flatten",
            OperatorKind::Linear => "linear",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Errors ───────────────────────────────────────────────────────

/// A block or architecture was rejected at construction or validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrError {
    /// A parameter is out of range for its operator.
    InvalidParam {
        op: &'static str,
        field: &'static str,
        reason: &'static str,
    },
    /// A required parameter is absent from a JSON description.
    MissingParam { op: &'static str, field: &'static str },
    /// A JSON description carries a parameter its operator does not take.
    UnknownParam { op: &'static str, field: String },
    /// Architectures hold at least one block.
    EmptyArchitecture,
    /// Replaying shapes failed at `index`.
    Shape { index: usize, source: ShapeError },
    /// The block sequence breaks a structural rule.
    Structure(&'static str),
    /// A JSON description could not be read or written.
    Json(String),
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrError::InvalidParam { op, field, reason } => {
                write!(f, "invalid {} parameter '{}': {}", op, field, reason)
            }
            IrError::MissingParam { op, field } => {
                write!(f, "{} block is missing required parameter '{}'", op, field)
            }
            IrError::UnknownParam { op, field } => {
                write!(f, "{} block does not take parameter '{}'", op, field)
            }
            IrError::EmptyArchitecture => write!(f, "architecture has no blocks"),
            IrError::Shape { index, source } => write!(f, "block {}: {}", index, source),
            IrError::Structure(msg) => write!(f, "malformed architecture: {}", msg),
            IrError::Json(msg) => write!(f, "invalid architecture JSON: {}", msg),
        }
    }
}

impl std::error::Error for IrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IrError::Shape { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn positive(op: &'static str, field: &'static str, value: usize) -> Result<usize, IrError> {
    if value == 0 {
        return Err(IrError::InvalidParam {
            op,
            field,
            reason: "must be positive",
        });
    }
    Ok(value)
}

// ─── Parameters ───────────────────────────────────────────────────

/// Convolution padding: a fixed border width, or "same".
///
/// "same" always yields `ceil(in / stride)` per spatial dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Padding {
    Same,
    Explicit(usize),
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Same => write!(f, "same"),
            Padding::Explicit(p) => write!(f, "{}", p),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConvParams {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    padding: Padding,
    stride: usize,
}

impl ConvParams {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: Padding,
        stride: usize,
    ) -> Result<Self, IrError> {
        Ok(Self {
            in_channels: positive("conv", "in_channels", in_channels)?,
            out_channels: positive("conv", "out_channels", out_channels)?,
            kernel_size: positive("conv", "kernel_size", kernel_size)?,
            padding,
            stride: positive("conv", "stride", stride)?,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolParams {
    kernel_size: usize,
    stride: usize,
}

impl PoolParams {
    pub fn new(kernel_size: usize, stride: usize) -> Result<Self, IrError> {
        Ok(Self {
            kernel_size: positive("max_pool", "kernel_size", kernel_size)?,
            stride: positive("max_pool", "stride", stride)?,
        })
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

/// Flatten's width is derived from the incoming feature map, never chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlattenParams {
    in_features: usize,
}

impl FlattenParams {
    pub fn new(in_features: usize) -> Result<Self, IrError> {
        Ok(Self {
            in_features: positive("flatten", "in_features", in_features)?,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinearParams {
    in_features: usize,
    out_features: usize,
}

impl LinearParams {
    pub fn new(in_features: usize, out_features: usize) -> Result<Self, IrError> {
        Ok(Self {
            in_features: positive("linear", "in_features", in_features)?,
            out_features: positive("linear", "out_features", out_features)?,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }
}

// ─── Blocks ───────────────────────────────────────────────────────

/// One IR node: an operator kind together with its own parameter record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "json::RawBlock", into = "json::RawBlock")]
pub enum OperatorBlock {
    Conv(ConvParams),
    Relu,
    MaxPool(PoolParams),
    GlobalAvgPool,
    Flatten(FlattenParams),
    Linear(LinearParams),
    /// A block read from an external description whose operator this IR
    /// does not model. It has no shape rule and no lowering. Only the
    /// operator name is kept; its parameters are dropped on reading.
    Opaque(String),
}

impl OperatorBlock {
    pub fn conv(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: Padding,
        stride: usize,
    ) -> Result<Self, IrError> {
        ConvParams::new(in_channels, out_channels, kernel_size, padding, stride)
            .map(OperatorBlock::Conv)
    }

    pub fn max_pool(kernel_size: usize, stride: usize) -> Result<Self, IrError> {
        PoolParams::new(kernel_size, stride).map(OperatorBlock::MaxPool)
    }

    pub fn flatten(in_features: usize) -> Result<Self, IrError> {
        FlattenParams::new(in_features).map(OperatorBlock::Flatten)
    }

    pub fn linear(in_features: usize, out_features: usize) -> Result<Self, IrError> {
        LinearParams::new(in_features, out_features).map(OperatorBlock::Linear)
    }

    /// The operator kind, or `None` for an opaque block.
    pub fn kind(&self) -> Option<OperatorKind> {
        match self {
            OperatorBlock::Conv(_) => Some(OperatorKind::Conv),
            OperatorBlock::Relu => Some(OperatorKind::Relu),
            OperatorBlock::MaxPool(_) => Some(OperatorKind::MaxPool),
            OperatorBlock::GlobalAvgPool => Some(OperatorKind::GlobalAvgPool),
            OperatorBlock::Flatten(_) => Some(OperatorKind::Flatten),
            OperatorBlock::Linear(_) => Some(OperatorKind::Linear),
            OperatorBlock::Opaque(_) => None,
        }
    }

    /// Operator name as written in JSON descriptions.
    pub fn name(&self) -> &str {
        match self {
            OperatorBlock::Opaque(name) => name,
            _ => self.static_name(),
        }
    }

    pub(crate) fn static_name(&self) -> &'static str {
        self.kind().map_or("opaque", OperatorKind::name)
    }
}

impl fmt::Display for OperatorBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorBlock::Conv(p) => write!(
                f,
                "conv({}->{}, k={}, s={}, pad={})",
                p.in_channels, p.out_channels, p.kernel_size, p.stride, p.padding
            ),
            OperatorBlock::MaxPool(p) => write!(f, "max_pool(k={}, s={})", p.kernel_size, p.stride),
            OperatorBlock::Flatten(p) => write!(f, "flatten({})", p.in_features),
            OperatorBlock::Linear(p) => {
                write!(f, "linear({}->{})", p.in_features, p.out_features)
            }
            OperatorBlock::Opaque(name) => write!(f, "{}(?)", name),
            OperatorBlock::Relu | OperatorBlock::GlobalAvgPool => f.write_str(self.name()),
        }
    }
}

// ─── Architecture ─────────────────────────────────────────────────

/// An immutable, non-empty sequence of blocks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<OperatorBlock>", into = "Vec<OperatorBlock>")]
pub struct Architecture {
    blocks: Vec<OperatorBlock>,
}

impl Architecture {
    /// Wrap a block sequence. Only emptiness is checked here; shape and
    /// structure are checked by [`Architecture::validate`].
    pub fn new(blocks: Vec<OperatorBlock>) -> Result<Self, IrError> {
        if blocks.is_empty() {
            return Err(IrError::EmptyArchitecture);
        }
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[OperatorBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Per-block `(kind, params)` view for external consumers.
    pub fn iter(&self) -> std::slice::Iter<'_, OperatorBlock> {
        self.blocks.iter()
    }

    /// Replay shapes from `input` and check the structural invariants:
    /// the sequence ends in `linear`, and the 2-D to 1-D switch happens at
    /// most once, through one `global_avg_pool` directly followed by one
    /// `flatten`. Returns the final shape.
    pub fn validate(&self, input: ShapeState) -> Result<ShapeState, IrError> {
        let mut shape = input;
        let mut pools = 0usize;
        for (index, block) in self.blocks.iter().enumerate() {
            let next = propagate(shape, block).map_err(|source| IrError::Shape { index, source })?;
            match block {
                OperatorBlock::GlobalAvgPool => {
                    pools += 1;
                    if pools > 1 {
                        return Err(IrError::Structure("more than one global_avg_pool"));
                    }
                    if !matches!(self.blocks.get(index + 1), Some(OperatorBlock::Flatten(_))) {
                        return Err(IrError::Structure(
                            "global_avg_pool must be directly followed by flatten",
                        ));
                    }
                }
                OperatorBlock::Flatten(_) => {
                    let after_pool =
                        index > 0 && self.blocks[index - 1] == OperatorBlock::GlobalAvgPool;
                    if !after_pool {
                        return Err(IrError::Structure(
                            "flatten must directly follow global_avg_pool",
                        ));
                    }
                }
                _ => {}
            }
            shape = next;
        }
        match self.blocks.last() {
            Some(OperatorBlock::Linear(_)) => Ok(shape),
            _ => Err(IrError::Structure("architecture must end in a linear block")),
        }
    }

    /// BLAKE3 content hash of the block sequence, hex-encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for block in &self.blocks {
            hasher.update(block.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn from_json(text: &str) -> Result<Self, IrError> {
        serde_json::from_str(text).map_err(|e| IrError::Json(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, IrError> {
        serde_json::to_string_pretty(self).map_err(|e| IrError::Json(e.to_string()))
    }
}

impl TryFrom<Vec<OperatorBlock>> for Architecture {
    type Error = IrError;

    fn try_from(blocks: Vec<OperatorBlock>) -> Result<Self, IrError> {
        Architecture::new(blocks)
    }
}

impl From<Architecture> for Vec<OperatorBlock> {
    fn from(arch: Architecture) -> Self {
        arch.blocks
    }
}

impl<'a> IntoIterator for &'a Architecture {
    type Item = &'a OperatorBlock;
    type IntoIter = std::slice::Iter<'a, OperatorBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", block)?;
        }
        Ok(())
    }
}
