//! Shape propagation: the single place where output dimensions are derived.
//!
//! Both the synthesizer and the lowering compiler replay these rules, so a
//! topology that synthesizes cleanly lowers to exactly the same shapes.

use std::fmt;

use super::{ConvParams, OperatorBlock, Padding, PoolParams};

// ─── Shape state ──────────────────────────────────────────────────

/// Whether a tensor is still a feature map or already a flat vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    TwoD,
    OneD,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::TwoD => write!(f, "2-D"),
            Mode::OneD => write!(f, "1-D"),
        }
    }
}

/// Dimensions of the tensor flowing between two blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeState {
    TwoD {
        channels: usize,
        height: usize,
        width: usize,
    },
    OneD {
        features: usize,
    },
}

impl ShapeState {
    pub fn image(channels: usize, height: usize, width: usize) -> Self {
        ShapeState::TwoD {
            channels,
            height,
            width,
        }
    }

    pub fn vector(features: usize) -> Self {
        ShapeState::OneD { features }
    }

    pub fn mode(&self) -> Mode {
        match self {
            ShapeState::TwoD { .. } => Mode::TwoD,
            ShapeState::OneD { .. } => Mode::OneD,
        }
    }

    /// Number of scalar elements a buffer must hold for this tensor.
    /// Saturates instead of wrapping; capacity checks clamp it anyway.
    pub fn elements(&self) -> usize {
        match *self {
            ShapeState::TwoD {
                channels,
                height,
                width,
            } => channels.saturating_mul(height).saturating_mul(width),
            ShapeState::OneD { features } => features,
        }
    }
}

impl fmt::Display for ShapeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeState::TwoD {
                channels,
                height,
                width,
            } => write!(f, "{}x{}x{}", channels, height, width),
            ShapeState::OneD { features } => write!(f, "{}", features),
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────

/// A block cannot legally apply to the current shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeError {
    /// The block expects the other tensor mode.
    ModeMismatch { op: &'static str, found: Mode },
    /// A declared `in_*` field disagrees with the replayed shape.
    InputMismatch {
        op: &'static str,
        field: &'static str,
        declared: usize,
        actual: usize,
    },
    /// The block would produce a dimension of zero or less.
    NonPositive { op: &'static str, dim: &'static str },
    /// An element count does not fit in `usize`.
    Overflow { op: &'static str },
    /// No shape rule exists for this block.
    Unsupported { name: String },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::ModeMismatch { op, found } => {
                write!(f, "{} cannot apply to a {} tensor", op, found)
            }
            ShapeError::InputMismatch {
                op,
                field,
                declared,
                actual,
            } => write!(
                f,
                "{} declares {} = {}, but the incoming tensor has {}",
                op, field, declared, actual
            ),
            ShapeError::NonPositive { op, dim } => {
                write!(f, "{} would produce a non-positive {}", op, dim)
            }
            ShapeError::Overflow { op } => write!(f, "{} overflows the element count", op),
            ShapeError::Unsupported { name } => {
                write!(f, "no shape rule for operator '{}'", name)
            }
        }
    }
}

impl std::error::Error for ShapeError {}

// ─── Propagation ──────────────────────────────────────────────────

/// Apply one block to `state` and return the resulting shape.
pub fn propagate(state: ShapeState, block: &OperatorBlock) -> Result<ShapeState, ShapeError> {
    let op = block.static_name();
    let next = match (block, state) {
        (OperatorBlock::Relu, state) => state,

        (
            OperatorBlock::Conv(params),
            ShapeState::TwoD {
                channels,
                height,
                width,
            },
        ) => {
            expect_input(op, "in_channels", params.in_channels(), channels)?;
            ShapeState::TwoD {
                channels: params.out_channels(),
                height: conv_dim(params, "height", height)?,
                width: conv_dim(params, "width", width)?,
            }
        }

        (
            OperatorBlock::MaxPool(params),
            ShapeState::TwoD {
                channels,
                height,
                width,
            },
        ) => ShapeState::TwoD {
            channels,
            height: pool_dim(params, "height", height)?,
            width: pool_dim(params, "width", width)?,
        },

        (OperatorBlock::GlobalAvgPool, ShapeState::TwoD { channels, .. }) => ShapeState::TwoD {
            channels,
            height: 1,
            width: 1,
        },

        (
            OperatorBlock::Flatten(params),
            ShapeState::TwoD {
                channels,
                height,
                width,
            },
        ) => {
            let features = channels
                .checked_mul(height)
                .and_then(|n| n.checked_mul(width))
                .ok_or(ShapeError::Overflow { op })?;
            expect_input(op, "in_features", params.in_features(), features)?;
            ShapeState::OneD { features }
        }

        (OperatorBlock::Linear(params), ShapeState::OneD { features }) => {
            expect_input(op, "in_features", params.in_features(), features)?;
            ShapeState::OneD {
                features: params.out_features(),
            }
        }

        (OperatorBlock::Opaque(name), _) => {
            return Err(ShapeError::Unsupported { name: name.clone() });
        }

        (_, state) => {
            return Err(ShapeError::ModeMismatch {
                op,
                found: state.mode(),
            });
        }
    };
    ensure_positive(op, next)
}

fn expect_input(
    op: &'static str,
    field: &'static str,
    declared: usize,
    actual: usize,
) -> Result<(), ShapeError> {
    if declared == actual {
        Ok(())
    } else {
        Err(ShapeError::InputMismatch {
            op,
            field,
            declared,
            actual,
        })
    }
}

/// `floor((in - k + 2p) / s) + 1`, or `ceil(in / s)` for "same" padding.
fn conv_dim(params: &ConvParams, dim: &'static str, input: usize) -> Result<usize, ShapeError> {
    match params.padding() {
        Padding::Same => Ok(input.div_ceil(params.stride())),
        Padding::Explicit(pad) => {
            window("conv", dim, input, params.kernel_size(), pad, params.stride())
        }
    }
}

/// `floor((in - k) / s) + 1`.
fn pool_dim(params: &PoolParams, dim: &'static str, input: usize) -> Result<usize, ShapeError> {
    window("max_pool", dim, input, params.kernel_size(), 0, params.stride())
}

fn window(
    op: &'static str,
    dim: &'static str,
    input: usize,
    kernel: usize,
    pad: usize,
    stride: usize,
) -> Result<usize, ShapeError> {
    let span = pad
        .checked_mul(2)
        .and_then(|p| p.checked_add(input))
        .ok_or(ShapeError::Overflow { op })?;
    // A negative numerator floors to a result of zero or less.
    if span < kernel {
        return Err(ShapeError::NonPositive { op, dim });
    }
    Ok((span - kernel) / stride + 1)
}

fn ensure_positive(op: &'static str, state: ShapeState) -> Result<ShapeState, ShapeError> {
    let zero = match state {
        ShapeState::TwoD {
            channels,
            height,
            width,
        } => [
            ("channels", channels),
            ("height", height),
            ("width", width),
        ]
        .into_iter()
        .find(|(_, v)| *v == 0)
        .map(|(dim, _)| dim),
        ShapeState::OneD { features } => (features == 0).then_some("features"),
    };
    match zero {
        Some(dim) => Err(ShapeError::NonPositive { op, dim }),
        None => Ok(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(cin: usize, cout: usize, k: usize, pad: Padding, stride: usize) -> OperatorBlock {
        OperatorBlock::conv(cin, cout, k, pad, stride).unwrap()
    }

    #[test]
    fn test_scenario_a_propagation() {
        let mut shape = ShapeState::image(3, 32, 32);
        let steps = [
            (conv(3, 32, 3, Padding::Same, 1), ShapeState::image(32, 32, 32)),
            (OperatorBlock::Relu, ShapeState::image(32, 32, 32)),
            (OperatorBlock::max_pool(2, 2).unwrap(), ShapeState::image(32, 16, 16)),
            (OperatorBlock::GlobalAvgPool, ShapeState::image(32, 1, 1)),
            (OperatorBlock::flatten(32).unwrap(), ShapeState::vector(32)),
            (OperatorBlock::linear(32, 128).unwrap(), ShapeState::vector(128)),
        ];
        for (block, expected) in steps {
            shape = propagate(shape, &block).unwrap();
            assert_eq!(shape, expected, "after {}", block);
        }
    }

    #[test]
    fn test_conv_numeric_padding_with_stride() {
        // floor((32 - 3 + 2) / 2) + 1 = 16
        let out = propagate(
            ShapeState::image(3, 32, 32),
            &conv(3, 8, 3, Padding::Explicit(1), 2),
        )
        .unwrap();
        assert_eq!(out, ShapeState::image(8, 16, 16));
    }

    #[test]
    fn test_conv_same_padding_rounds_up() {
        let out = propagate(
            ShapeState::image(4, 7, 9),
            &conv(4, 4, 5, Padding::Same, 2),
        )
        .unwrap();
        assert_eq!(out, ShapeState::image(4, 4, 5));
    }

    #[test]
    fn test_max_pool_floor() {
        let out = propagate(
            ShapeState::image(16, 7, 7),
            &OperatorBlock::max_pool(2, 2).unwrap(),
        )
        .unwrap();
        assert_eq!(out, ShapeState::image(16, 3, 3));
    }

    #[test]
    fn test_non_positive_dimension_is_error() {
        let err = propagate(
            ShapeState::image(8, 2, 2),
            &OperatorBlock::max_pool(3, 1).unwrap(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ShapeError::NonPositive {
                op: "max_pool",
                dim: "height",
            }
        );

        let err = propagate(ShapeState::image(0, 4, 4), &OperatorBlock::Relu).unwrap_err();
        assert_eq!(
            err,
            ShapeError::NonPositive {
                op: "relu",
                dim: "channels",
            }
        );
    }

    #[test]
    fn test_mode_mismatch() {
        let linear = OperatorBlock::linear(12, 4).unwrap();
        assert_eq!(
            propagate(ShapeState::image(3, 2, 2), &linear),
            Err(ShapeError::ModeMismatch {
                op: "linear",
                found: Mode::TwoD,
            })
        );
        assert_eq!(
            propagate(ShapeState::vector(12), &OperatorBlock::GlobalAvgPool),
            Err(ShapeError::ModeMismatch {
                op: "global_avg_pool",
                found: Mode::OneD,
            })
        );
    }

    #[test]
    fn test_declared_inputs_are_checked() {
        assert_eq!(
            propagate(ShapeState::image(3, 8, 8), &conv(4, 8, 3, Padding::Same, 1)),
            Err(ShapeError::InputMismatch {
                op: "conv",
                field: "in_channels",
                declared: 4,
                actual: 3,
            })
        );
        assert!(propagate(
            ShapeState::image(3, 2, 2),
            &OperatorBlock::flatten(3).unwrap()
        )
        .is_err());
        let linear = OperatorBlock::linear(11, 2).unwrap();
        assert!(propagate(ShapeState::vector(10), &linear).is_err());
    }

    #[test]
    fn test_flatten_uses_current_feature_map() {
        let out = propagate(
            ShapeState::image(5, 3, 2),
            &OperatorBlock::flatten(30).unwrap(),
        )
        .unwrap();
        assert_eq!(out, ShapeState::vector(30));
        assert_eq!(out.mode(), Mode::OneD);
    }

    #[test]
    fn test_opaque_has_no_rule() {
        assert_eq!(
            propagate(ShapeState::vector(4), &OperatorBlock::Opaque("add".into())),
            Err(ShapeError::Unsupported { name: "add".into() })
        );
    }

    #[test]
    fn test_elements() {
        assert_eq!(ShapeState::image(128, 32, 32).elements(), 131_072);
        assert_eq!(ShapeState::vector(10).elements(), 10);
        assert_eq!(ShapeState::image(usize::MAX, 2, 2).elements(), usize::MAX);
    }

    #[test]
    fn test_flatten_overflow() {
        let flatten = OperatorBlock::flatten(1).unwrap();
        assert_eq!(
            propagate(ShapeState::image(usize::MAX, 2, 1), &flatten),
            Err(ShapeError::Overflow { op: "flatten" })
        );
    }

    #[test]
    fn test_padded_window_overflow() {
        let block = conv(1, 1, 3, Padding::Explicit(1), 2);
        assert_eq!(
            propagate(ShapeState::image(1, usize::MAX, 8), &block),
            Err(ShapeError::Overflow { op: "conv" })
        );
    }
}
