use std::path::PathBuf;
use std::process;

use super::load_architecture;

pub fn cmd_features(input: PathBuf, json: bool) {
    let arch = load_architecture(&input);
    let features = hwnas::features::featurize(&arch);
    if json {
        match serde_json::to_string_pretty(&features) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    } else {
        let values: Vec<_> = features.to_array().iter().map(|v| v.to_string()).collect();
        println!("{}", values.join(" "));
    }
}
