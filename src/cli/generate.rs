use std::path::PathBuf;

use super::{load_config, or_exit, report_warnings};

pub fn cmd_generate(config: Option<PathBuf>, seed: u64, output: PathBuf, stem: Option<String>) {
    let config = load_config(config.as_deref());
    let artifact = or_exit(hwnas::api::generate(&config, seed));
    report_warnings(&artifact);

    let stem = stem.unwrap_or_else(|| format!("design_seed{}", seed));
    let path = or_exit(hwnas::api::save_artifact(&output, &stem, &artifact));
    eprintln!("Architecture: {}", artifact.architecture);
    println!("{}", path.display());
}
