use std::path::PathBuf;
use std::process;

use super::{load_config, or_exit, report_warnings};

pub fn cmd_sample(config: Option<PathBuf>, seed: u64, count: usize, output: PathBuf) {
    if count == 0 {
        eprintln!("error: --count must be at least 1");
        process::exit(1);
    }
    let config = load_config(config.as_deref());
    let artifacts = or_exit(hwnas::api::sample(&config, seed, count));
    for artifact in &artifacts {
        report_warnings(artifact);
    }
    let manifest = or_exit(hwnas::api::write_manifest(&output, &artifacts));

    let distinct: std::collections::HashSet<_> =
        artifacts.iter().map(|a| a.fingerprint()).collect();
    eprintln!(
        "Generated {} candidates ({} distinct) in {}",
        artifacts.len(),
        distinct.len(),
        output.display()
    );
    println!("{}", manifest.display());
}
