pub mod features;
pub mod generate;
pub mod lower;
pub mod sample;

use std::path::Path;
use std::process;

use hwnas::api::Artifact;
use hwnas::config::Config;
use hwnas::ir::Architecture;

/// Load a JSON config file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    let text = read_file(path);
    match Config::from_json(&text) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Load a hand-written architecture description.
pub fn load_architecture(path: &Path) -> Architecture {
    let text = read_file(path);
    match Architecture::from_json(&text) {
        Ok(arch) => arch,
        Err(e) => {
            eprintln!("error: {}: {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn read_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

/// Unwrap a pipeline result or exit with its message.
pub fn or_exit<T>(result: Result<T, hwnas::api::Error>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

pub fn report_warnings(artifact: &Artifact) {
    for warning in &artifact.program.warnings {
        eprintln!("warning: {}", warning);
    }
}
