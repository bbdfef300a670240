pub mod api;
pub mod config;
pub mod emit;
pub mod features;
pub mod ir;
pub mod lower;
pub mod synth;

pub use api::{compile, generate, sample, save_artifact, Artifact, Error};
pub use config::Config;
pub use ir::{Architecture, OperatorBlock, OperatorKind, ShapeState};
