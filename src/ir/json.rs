//! JSON interchange form of blocks: `{ "op": "conv", "in_channels": 3, ... }`.
//!
//! This is the only loosely-keyed representation in the crate. It is turned
//! into a typed `OperatorBlock` immediately, so missing or out-of-range
//! fields are rejected while reading, not during lowering.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{IrError, OperatorBlock, OperatorKind, Padding};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RawBlock {
    op: String,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl RawBlock {
    fn usize_field(&self, op: &'static str, field: &'static str) -> Result<usize, IrError> {
        let value = self
            .params
            .get(field)
            .ok_or(IrError::MissingParam { op, field })?;
        value
            .as_u64()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or(IrError::InvalidParam {
                op,
                field,
                reason: "must be a non-negative integer",
            })
    }

    fn deny_unknown(&self, op: &'static str, allowed: &[&str]) -> Result<(), IrError> {
        match self.params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(field) => Err(IrError::UnknownParam {
                op,
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    fn padding_field(&self) -> Result<Padding, IrError> {
        let field = "padding";
        match self.params.get(field) {
            None => Err(IrError::MissingParam { op: "conv", field }),
            Some(Value::String(s)) if s == "same" => Ok(Padding::Same),
            Some(value) => value
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .map(Padding::Explicit)
                .ok_or(IrError::InvalidParam {
                    op: "conv",
                    field,
                    reason: "must be \"same\" or a non-negative integer",
                }),
        }
    }
}

/// Parameter keys each operator accepts.
fn fields(kind: OperatorKind) -> &'static [&'static str] {
    match kind {
        OperatorKind::Conv => &["in_channels", "out_channels", "kernel_size", "padding", "stride"],
        OperatorKind::MaxPool => &["kernel_size", "stride"],
        OperatorKind::Flatten => &["in_features"],
        OperatorKind::Linear => &["in_features", "out_features"],
        OperatorKind::Relu | OperatorKind::GlobalAvgPool => &[],
    }
}

impl TryFrom<RawBlock> for OperatorBlock {
    type Error = IrError;

    fn try_from(raw: RawBlock) -> Result<Self, IrError> {
        let Some(kind) = OperatorKind::from_name(&raw.op) else {
            return Ok(OperatorBlock::Opaque(raw.op));
        };
        let op = kind.name();
        raw.deny_unknown(op, fields(kind))?;
        match kind {
            OperatorKind::Conv => OperatorBlock::conv(
                raw.usize_field(op, "in_channels")?,
                raw.usize_field(op, "out_channels")?,
                raw.usize_field(op, "kernel_size")?,
                raw.padding_field()?,
                raw.usize_field(op, "stride")?,
            ),
            OperatorKind::Relu => Ok(OperatorBlock::Relu),
            OperatorKind::MaxPool => OperatorBlock::max_pool(
                raw.usize_field(op, "kernel_size")?,
                raw.usize_field(op, "stride")?,
            ),
            OperatorKind::GlobalAvgPool => Ok(OperatorBlock::GlobalAvgPool),
            OperatorKind::Flatten => OperatorBlock::flatten(raw.usize_field(op, "in_features")?),
            OperatorKind::Linear => OperatorBlock::linear(
                raw.usize_field(op, "in_features")?,
                raw.usize_field(op, "out_features")?,
            ),
        }
    }
}

impl From<OperatorBlock> for RawBlock {
    fn from(block: OperatorBlock) -> Self {
        let mut params = Map::new();
        let mut put = |key: &str, value: Value| {
            params.insert(key.to_string(), value);
        };
        match &block {
            OperatorBlock::Conv(p) => {
                put("in_channels", p.in_channels().into());
                put("out_channels", p.out_channels().into());
                put("kernel_size", p.kernel_size().into());
                put(
                    "padding",
                    match p.padding() {
                        Padding::Same => Value::from("same"),
                        Padding::Explicit(n) => Value::from(n),
                    },
                );
                put("stride", p.stride().into());
            }
            OperatorBlock::MaxPool(p) => {
                put("kernel_size", p.kernel_size().into());
                put("stride", p.stride().into());
            }
            OperatorBlock::Flatten(p) => put("in_features", p.in_features().into()),
            OperatorBlock::Linear(p) => {
                put("in_features", p.in_features().into());
                put("out_features", p.out_features().into());
            }
            OperatorBlock::Relu | OperatorBlock::GlobalAvgPool | OperatorBlock::Opaque(_) => {}
        }
        RawBlock {
            op: block.name().to_string(),
            params,
        }
    }
}
