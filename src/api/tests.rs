use super::*;

const SCENARIO_D: &str = r#"[
    {"op": "conv", "in_channels": 3, "out_channels": 8, "kernel_size": 3, "padding": "same", "stride": 1},
    {"op": "add"},
    {"op": "global_avg_pool"},
    {"op": "flatten", "in_features": 8},
    {"op": "linear", "in_features": 8, "out_features": 4}
]"#;

#[test]
fn test_compile_renders_design() {
    let arch = Architecture::from_json(
        r#"[
            {"op": "relu"},
            {"op": "global_avg_pool"},
            {"op": "flatten", "in_features": 3},
            {"op": "linear", "in_features": 3, "out_features": 10}
        ]"#,
    )
    .unwrap();
    let artifact = compile(&arch, &Config::default()).unwrap();
    assert_eq!(artifact.seed, None);
    assert_eq!(artifact.program.output_features, Some(10));
    assert!(artifact.source.contains("void top_function("));
    assert!(artifact
        .source
        .contains("linear(buffer_b, buffer_a, dummy_weights, dummy_bias, 3, 10);"));
    assert_eq!(artifact.features.linears, 1);
}

#[test]
fn test_unknown_operator_stops_generation() {
    let arch = Architecture::from_json(SCENARIO_D).unwrap();
    match compile(&arch, &Config::default()) {
        Err(Error::Lower(LowerError::UnsupportedOperator { index, name })) => {
            assert_eq!(index, 1);
            assert_eq!(name, "add");
        }
        other => panic!("expected unsupported operator, got {:?}", other),
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = Config {
        max_depth: 1,
        ..Config::default()
    };
    assert!(matches!(generate(&config, 0), Err(Error::Config(_))));
    assert!(matches!(sample(&config, 0, 4), Err(Error::Config(_))));
}

#[test]
fn test_generate_is_reproducible() {
    let config = Config::default();
    let a = generate(&config, 17).unwrap();
    let b = generate(&config, 17).unwrap();
    assert_eq!(a.seed, Some(17));
    assert_eq!(a.source, b.source);
    assert_eq!(a.architecture, b.architecture);
}

#[test]
fn test_sample_matches_sequential_generation() {
    let config = Config::default();
    let batch = sample(&config, 100, 8).unwrap();
    assert_eq!(batch.len(), 8);
    for (i, artifact) in batch.iter().enumerate() {
        let single = generate(&config, 100 + i as u64).unwrap();
        assert_eq!(artifact.seed, Some(100 + i as u64));
        assert_eq!(artifact.architecture, single.architecture);
        assert_eq!(artifact.source, single.source);
    }
}

#[test]
fn test_sample_wraps_seed() {
    let batch = sample(&Config::default(), u64::MAX, 2).unwrap();
    assert_eq!(batch[0].seed, Some(u64::MAX));
    assert_eq!(batch[1].seed, Some(0));
}

#[test]
fn test_write_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let batch = sample(&Config::default(), 0, 3).unwrap();
    let path = write_manifest(dir.path(), &batch).unwrap();

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let entries = manifest.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    for (entry, artifact) in entries.iter().zip(&batch) {
        assert_eq!(entry["fingerprint"], artifact.fingerprint());
        let design = dir.path().join(entry["design"].as_str().unwrap());
        assert_eq!(fs::read_to_string(design).unwrap(), artifact.source);
        assert_eq!(entry["output_features"], 128);
    }
}

#[test]
fn test_error_display_names_path() {
    let err = Error::Io {
        path: PathBuf::from("/nowhere/design.cpp"),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
    };
    assert_eq!(err.to_string(), "/nowhere/design.cpp: missing");
}
