//! Pipeline entry points: synthesize, lower and render in one call.
//!
//! The core modules never touch the filesystem; `save_artifact` and
//! `write_manifest` are the only sinks.

#[cfg(test)]
mod tests;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{Config, ConfigError};
use crate::emit::{Emitter, HlsEmitter};
use crate::features::{featurize, FeatureVector};
use crate::ir::{Architecture, IrError};
use crate::lower::{lower, LowerError, Program};
use crate::synth::{SynthError, Synthesizer};

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug)]
pub enum Error {
    Config(ConfigError),
    Ir(IrError),
    Synth(SynthError),
    Lower(LowerError),
    Json(serde_json::Error),
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "{}", e),
            Error::Ir(e) => write!(f, "{}", e),
            Error::Synth(e) => write!(f, "{}", e),
            Error::Lower(e) => write!(f, "lowering failed: {}", e),
            Error::Json(e) => write!(f, "cannot serialize: {}", e),
            Error::Io { path, source } => write!(f, "{}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Ir(e) => Some(e),
            Error::Synth(e) => Some(e),
            Error::Lower(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<IrError> for Error {
    fn from(e: IrError) -> Self {
        Error::Ir(e)
    }
}

impl From<SynthError> for Error {
    fn from(e: SynthError) -> Self {
        Error::Synth(e)
    }
}

impl From<LowerError> for Error {
    fn from(e: LowerError) -> Self {
        Error::Lower(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ─── Artifacts ────────────────────────────────────────────────────

/// Everything produced for one architecture.
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Seed the architecture was synthesized from; `None` for hand-written ones.
    pub seed: Option<u64>,
    pub architecture: Architecture,
    pub program: Program,
    /// Rendered HLS source.
    pub source: String,
    pub features: FeatureVector,
}

impl Artifact {
    pub fn fingerprint(&self) -> String {
        self.architecture.fingerprint()
    }
}

/// Lower and render a given architecture.
pub fn compile(architecture: &Architecture, config: &Config) -> Result<Artifact, Error> {
    config.validate()?;
    let program = lower(architecture, config.initial_shape(), config.buffer_plan())?;
    let source = HlsEmitter::new().render(&program);
    Ok(Artifact {
        seed: None,
        architecture: architecture.clone(),
        features: featurize(architecture),
        program,
        source,
    })
}

/// Synthesize one candidate from `seed`, then compile it.
pub fn generate(config: &Config, seed: u64) -> Result<Artifact, Error> {
    let candidate = Synthesizer::seeded(config.clone(), seed)?.synthesize()?;
    info!(
        "seed {}: {} ({} outputs)",
        seed, candidate.architecture, candidate.output_features
    );
    let mut artifact = compile(&candidate.architecture, config)?;
    artifact.seed = Some(seed);
    Ok(artifact)
}

/// Generate `count` candidates from seeds `seed, seed + 1, ...` in parallel.
/// Results come back in seed order.
pub fn sample(config: &Config, seed: u64, count: usize) -> Result<Vec<Artifact>, Error> {
    config.validate()?;
    (0..count as u64)
        .into_par_iter()
        .map(|i| generate(config, seed.wrapping_add(i)))
        .collect()
}

/// Write `<stem>.cpp` and `<stem>.json` into `dir`. Returns the design path.
pub fn save_artifact(dir: &Path, stem: &str, artifact: &Artifact) -> Result<PathBuf, Error> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let design = dir.join(format!("{}.cpp", stem));
    fs::write(&design, &artifact.source).map_err(io_error(&design))?;
    let json = dir.join(format!("{}.json", stem));
    fs::write(&json, artifact.architecture.to_json()?).map_err(io_error(&json))?;
    info!("wrote {}", design.display());
    Ok(design)
}

/// One row of a batch manifest.
#[derive(Clone, Debug, Serialize)]
pub struct ManifestEntry {
    pub seed: Option<u64>,
    pub fingerprint: String,
    pub design: String,
    pub architecture: String,
    pub output_features: Option<usize>,
    pub capacity_warnings: usize,
    pub features: FeatureVector,
}

/// Save every artifact under its fingerprint and write `manifest.json`.
pub fn write_manifest(dir: &Path, artifacts: &[Artifact]) -> Result<PathBuf, Error> {
    let mut entries = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let fingerprint = artifact.fingerprint();
        let stem = format!("design_{}", &fingerprint[..16]);
        save_artifact(dir, &stem, artifact)?;
        entries.push(ManifestEntry {
            seed: artifact.seed,
            design: format!("{}.cpp", stem),
            architecture: artifact.architecture.to_string(),
            output_features: artifact.program.output_features,
            capacity_warnings: artifact.program.warnings.len(),
            features: artifact.features,
            fingerprint,
        });
    }
    let path = dir.join("manifest.json");
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    fs::write(&path, serde_json::to_string_pretty(&entries)?).map_err(io_error(&path))?;
    Ok(path)
}
