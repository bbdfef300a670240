use std::path::PathBuf;
use std::process;

use super::{load_architecture, load_config, or_exit, report_warnings};

pub fn cmd_lower(input: PathBuf, config: Option<PathBuf>, output: Option<PathBuf>, listing: bool) {
    let config = load_config(config.as_deref());
    let arch = load_architecture(&input);
    let artifact = or_exit(hwnas::api::compile(&arch, &config));
    report_warnings(&artifact);

    if listing {
        for inst in &artifact.program.instructions {
            println!("{}", inst);
        }
        return;
    }

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &artifact.source) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{}", artifact.source),
    }
}
