//! Lowering: replays shape propagation over an `Architecture` and produces
//! a buffer-explicit instruction stream for an HLS backend.
//!
//! The compiler never trusts shapes recorded during synthesis. It starts
//! from the given input shape, applies [`crate::ir::propagate`] block by
//! block, and derives every primitive argument from the replayed shapes.
//! Live element counts are checked against the buffer capacity before each
//! instruction; overflowing counts are clamped and reported as
//! [`CapacityWarning`]s, never silently.


use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::ir::{propagate, Architecture, OperatorBlock, OperatorKind, ShapeError, ShapeState};

// ─── Buffers ──────────────────────────────────────────────────────

/// One of the two fixed-capacity feature buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Buffer {
    A,
    B,
}

impl Buffer {
    pub fn other(self) -> Buffer {
        match self {
            Buffer::A => Buffer::B,
            Buffer::B => Buffer::A,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Buffer::A => "buffer_a",
            Buffer::B => "buffer_b",
        }
    }
}

/// How operators share feature storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferPolicy {
    /// One buffer; every operator updates it in place.
    Single,
    /// Two buffers. Operators that write a new tensor read the live buffer
    /// and write the idle one, then the roles swap. Relu and flatten work
    /// in place.
    #[default]
    PingPong,
    /// Like `PingPong`, but in-place operators also copy the live buffer
    /// into the idle one and swap, so roles alternate after every block.
    PingPongMirror,
}

/// Storage the generated program assumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPlan {
    pub capacity: usize,
    pub policy: BufferPolicy,
}

impl BufferPlan {
    pub fn new(capacity: usize, policy: BufferPolicy) -> Self {
        Self { capacity, policy }
    }

    pub fn buffers(&self) -> &'static [Buffer] {
        match self.policy {
            BufferPolicy::Single => &[Buffer::A],
            BufferPolicy::PingPong | BufferPolicy::PingPongMirror => &[Buffer::A, Buffer::B],
        }
    }
}

// ─── Primitives ───────────────────────────────────────────────────

/// External procedures the backend provides. Names and operand order are
/// a contract with the backend: `(src, dst, <params() in order>)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Relu,
    Conv,
    MaxPool,
    AvgPool,
    Linear,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::Relu,
        Primitive::Conv,
        Primitive::MaxPool,
        Primitive::AvgPool,
        Primitive::Linear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Relu => "relu",
            Primitive::Conv => "conv",
            Primitive::MaxPool => "max_pool",
            Primitive::AvgPool => "avg_pool",
            Primitive::Linear => "linear",
        }
    }

    /// Names of the integer shape parameters following the two buffers.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Primitive::Relu => &["size"],
            Primitive::Conv => &[
                "in_channels",
                "out_channels",
                "kernel_size",
                "in_h",
                "in_w",
                "out_h",
                "out_w",
                "stride",
            ],
            Primitive::MaxPool => &["channels", "in_h", "in_w", "kernel_size", "stride"],
            Primitive::AvgPool => &["channels", "in_h", "in_w"],
            Primitive::Linear => &["in_features", "out_features"],
        }
    }

    /// Whether the backend signature takes weight and bias arrays.
    pub fn takes_weights(self) -> bool {
        matches!(self, Primitive::Conv | Primitive::Linear)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Instructions ─────────────────────────────────────────────────

/// The IR block an instruction was lowered from, with its capacity check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Site {
    pub index: usize,
    pub kind: OperatorKind,
    /// Elements live in the source buffer, already clamped to capacity.
    pub live: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `count` input elements into `dst`.
    Load { dst: Buffer, count: usize },
    /// Invoke a backend primitive.
    Call {
        site: Site,
        primitive: Primitive,
        src: Buffer,
        dst: Buffer,
        args: Vec<usize>,
    },
    /// Physically copy `count` elements between buffers.
    Copy {
        site: Site,
        src: Buffer,
        dst: Buffer,
        count: usize,
    },
    /// Reinterpret the live buffer as a flat vector; no data moves.
    Reinterpret { site: Site, features: usize },
    /// Copy `count` elements from `src` to the output.
    Store { src: Buffer, count: usize },
}

impl Instruction {
    pub fn site(&self) -> Option<&Site> {
        match self {
            Instruction::Call { site, .. }
            | Instruction::Copy { site, .. }
            | Instruction::Reinterpret { site, .. } => Some(site),
            Instruction::Load { .. } | Instruction::Store { .. } => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Load { dst, count } => {
                write!(f, "load {} <- input[{}]", dst.name(), count)
            }
            Instruction::Call {
                primitive,
                src,
                dst,
                args,
                ..
            } => {
                let args: Vec<_> = args.iter().map(|a| a.to_string()).collect();
                write!(
                    f,
                    "call {}({}, {}, [{}])",
                    primitive,
                    src.name(),
                    dst.name(),
                    args.join(", ")
                )
            }
            Instruction::Copy {
                src, dst, count, ..
            } => write!(f, "copy {} -> {} [{}]", src.name(), dst.name(), count),
            Instruction::Reinterpret { features, .. } => write!(f, "reinterpret [{}]", features),
            Instruction::Store { src, count } => {
                write!(f, "store output <- {}[{}]", src.name(), count)
            }
        }
    }
}

// ─── Diagnostics ──────────────────────────────────────────────────

/// Where a capacity clamp happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Load,
    Block { index: usize, kind: OperatorKind },
    Store,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Load => write!(f, "input load"),
            Location::Block { index, kind } => write!(f, "block {} ({})", index, kind),
            Location::Store => write!(f, "output store"),
        }
    }
}

/// A live tensor did not fit its buffer and was truncated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityWarning {
    pub location: Location,
    pub elements: usize,
    pub capacity: usize,
}

impl fmt::Display for CapacityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} live elements exceed capacity {}, clamped",
            self.location, self.elements, self.capacity
        )
    }
}

/// Lowering aborted; no program is produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LowerError {
    /// Shape replay failed at block `index`.
    Shape { index: usize, source: ShapeError },
    /// Block `index` has no lowering.
    UnsupportedOperator { index: usize, name: String },
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerError::Shape { index, source } => write!(f, "block {}: {}", index, source),
            LowerError::UnsupportedOperator { index, name } => {
                write!(f, "block {}: unsupported operator '{}'", index, name)
            }
        }
    }
}

impl std::error::Error for LowerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LowerError::Shape { source, .. } => Some(source),
            LowerError::UnsupportedOperator { .. } => None,
        }
    }
}

// ─── Program ──────────────────────────────────────────────────────

/// Output of lowering: the instruction stream and the storage it assumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    pub plan: BufferPlan,
    /// `Load` first, `Store` last.
    pub instructions: Vec<Instruction>,
    pub warnings: Vec<CapacityWarning>,
    /// Final feature count from the replay, `None` if the network never
    /// reached 1-D mode.
    pub output_features: Option<usize>,
    /// One-line description of the source architecture.
    pub summary: String,
}

/// Lower `architecture` starting from `input` under `plan`.
pub fn lower(
    architecture: &Architecture,
    input: ShapeState,
    plan: BufferPlan,
) -> Result<Program, LowerError> {
    let mut state = Lowering::new(plan);
    let load = state.clamp(Location::Load, input.elements());
    state.instructions.push(Instruction::Load {
        dst: state.live,
        count: load,
    });

    let mut shape = input;
    for (index, block) in architecture.iter().enumerate() {
        let Some(kind) = block.kind() else {
            return Err(LowerError::UnsupportedOperator {
                index,
                name: block.name().to_string(),
            });
        };
        let next = propagate(shape, block).map_err(|source| LowerError::Shape { index, source })?;
        let live = state.clamp(Location::Block { index, kind }, shape.elements());
        let site = Site { index, kind, live };
        state.lower_block(site, block, shape, next)?;
        debug!("lowered block {} ({}): {} -> {}", index, kind, shape, next);
        shape = next;
    }

    let output_features = match shape {
        ShapeState::OneD { features } => Some(features),
        ShapeState::TwoD { .. } => None,
    };
    let count = match output_features {
        Some(features) => state.clamp(Location::Store, features),
        None => plan.capacity,
    };
    state.instructions.push(Instruction::Store {
        src: state.live,
        count,
    });

    Ok(Program {
        plan,
        instructions: state.instructions,
        warnings: state.warnings,
        output_features,
        summary: architecture.to_string(),
    })
}

/// Traversal state. The live/idle buffer roles never leave this struct.
struct Lowering {
    plan: BufferPlan,
    live: Buffer,
    instructions: Vec<Instruction>,
    warnings: Vec<CapacityWarning>,
}

impl Lowering {
    fn new(plan: BufferPlan) -> Self {
        Self {
            plan,
            live: Buffer::A,
            instructions: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn clamp(&mut self, location: Location, elements: usize) -> usize {
        if elements <= self.plan.capacity {
            return elements;
        }
        let warning = CapacityWarning {
            location,
            elements,
            capacity: self.plan.capacity,
        };
        warn!("{}", warning);
        self.warnings.push(warning);
        self.plan.capacity
    }

    fn idle(&self) -> Buffer {
        match self.plan.policy {
            BufferPolicy::Single => self.live,
            BufferPolicy::PingPong | BufferPolicy::PingPongMirror => self.live.other(),
        }
    }

    /// Emit a call that writes a new tensor into the idle buffer.
    fn produce(&mut self, site: Site, primitive: Primitive, args: Vec<usize>) {
        let dst = self.idle();
        self.instructions.push(Instruction::Call {
            site,
            primitive,
            src: self.live,
            dst,
            args,
        });
        self.live = dst;
    }

    /// Under the mirror policy, copy the live buffer over and swap roles.
    fn mirror(&mut self, site: Site, count: usize) {
        if self.plan.policy != BufferPolicy::PingPongMirror {
            return;
        }
        let dst = self.idle();
        self.instructions.push(Instruction::Copy {
            site,
            src: self.live,
            dst,
            count,
        });
        self.live = dst;
    }

    fn lower_block(
        &mut self,
        site: Site,
        block: &OperatorBlock,
        shape: ShapeState,
        next: ShapeState,
    ) -> Result<(), LowerError> {
        use ShapeState::{OneD, TwoD};

        match (block, shape, next) {
            (
                OperatorBlock::Conv(p),
                TwoD {
                    channels,
                    height,
                    width,
                },
                TwoD {
                    height: out_h,
                    width: out_w,
                    ..
                },
            ) => self.produce(
                site,
                Primitive::Conv,
                vec![
                    channels,
                    p.out_channels(),
                    p.kernel_size(),
                    height,
                    width,
                    out_h,
                    out_w,
                    p.stride(),
                ],
            ),
            (
                OperatorBlock::MaxPool(p),
                TwoD {
                    channels,
                    height,
                    width,
                },
                _,
            ) => self.produce(
                site,
                Primitive::MaxPool,
                vec![channels, height, width, p.kernel_size(), p.stride()],
            ),
            (
                OperatorBlock::GlobalAvgPool,
                TwoD {
                    channels,
                    height,
                    width,
                },
                _,
            ) => self.produce(site, Primitive::AvgPool, vec![channels, height, width]),
            (OperatorBlock::Linear(p), _, _) => self.produce(
                site,
                Primitive::Linear,
                vec![p.in_features(), p.out_features()],
            ),
            (OperatorBlock::Relu, _, _) => {
                let live = self.live;
                self.instructions.push(Instruction::Call {
                    site,
                    primitive: Primitive::Relu,
                    src: live,
                    dst: live,
                    args: vec![site.live],
                });
                self.mirror(site, site.live);
            }
            (OperatorBlock::Flatten(_), _, OneD { features }) => {
                self.instructions
                    .push(Instruction::Reinterpret { site, features });
                self.mirror(site, site.live);
            }
            _ => {
                return Err(LowerError::Shape {
                    index: site.index,
                    source: ShapeError::ModeMismatch {
                        op: site.kind.name(),
                        found: shape.mode(),
                    },
                });
            }
        }
        Ok(())
    }
}
