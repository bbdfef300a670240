use super::*;

fn scenario_a() -> Architecture {
    Architecture::new(vec![
        OperatorBlock::conv(3, 32, 3, Padding::Same, 1).unwrap(),
        OperatorBlock::Relu,
        OperatorBlock::max_pool(2, 2).unwrap(),
        OperatorBlock::GlobalAvgPool,
        OperatorBlock::flatten(32).unwrap(),
        OperatorBlock::linear(32, 128).unwrap(),
    ])
    .unwrap()
}

#[test]
fn test_construction_rejects_non_positive_fields() {
    assert_eq!(
        OperatorBlock::conv(0, 32, 3, Padding::Same, 1),
        Err(IrError::InvalidParam {
            op: "conv",
            field: "in_channels",
            reason: "must be positive",
        })
    );
    assert!(OperatorBlock::conv(3, 32, 0, Padding::Same, 1).is_err());
    assert!(OperatorBlock::conv(3, 32, 3, Padding::Explicit(0), 0).is_err());
    assert!(OperatorBlock::max_pool(2, 0).is_err());
    assert!(OperatorBlock::flatten(0).is_err());
    assert!(OperatorBlock::linear(16, 0).is_err());
    // Zero padding is a legal explicit padding.
    assert!(OperatorBlock::conv(3, 32, 3, Padding::Explicit(0), 1).is_ok());
}

#[test]
fn test_empty_architecture_rejected() {
    assert_eq!(Architecture::new(vec![]), Err(IrError::EmptyArchitecture));
}

#[test]
fn test_kind_and_name() {
    assert_eq!(OperatorBlock::Relu.kind(), Some(OperatorKind::Relu));
    assert_eq!(OperatorBlock::GlobalAvgPool.name(), "global_avg_pool");
    let opaque = OperatorBlock::Opaque("add".into());
    assert_eq!(opaque.kind(), None);
    assert_eq!(opaque.name(), "add");
    for kind in OperatorKind::ALL {
        assert_eq!(OperatorKind::from_name(kind.name()), Some(kind));
    }
    assert_eq!(OperatorKind::from_name("add"), None);
}

#[test]
fn test_architecture_display() {
    assert_eq!(
        scenario_a().to_string(),
        "conv(3->32, k=3, s=1, pad=same) -> relu -> max_pool(k=2, s=2) -> \
         global_avg_pool -> flatten(32) -> linear(32->128)"
    );
}

#[test]
fn test_validate_scenario_a() {
    let arch = scenario_a();
    let out = arch.validate(ShapeState::image(3, 32, 32)).unwrap();
    assert_eq!(out, ShapeState::vector(128));
}

#[test]
fn test_validate_requires_trailing_linear() {
    let arch = Architecture::new(vec![
        OperatorBlock::GlobalAvgPool,
        OperatorBlock::flatten(3).unwrap(),
        OperatorBlock::linear(3, 10).unwrap(),
        OperatorBlock::Relu,
    ])
    .unwrap();
    assert_eq!(
        arch.validate(ShapeState::image(3, 8, 8)),
        Err(IrError::Structure("architecture must end in a linear block"))
    );
}

#[test]
fn test_validate_requires_pool_before_flatten() {
    let arch = Architecture::new(vec![
        OperatorBlock::flatten(192).unwrap(),
        OperatorBlock::linear(192, 10).unwrap(),
    ])
    .unwrap();
    assert_eq!(
        arch.validate(ShapeState::image(3, 8, 8)),
        Err(IrError::Structure(
            "flatten must directly follow global_avg_pool"
        ))
    );
}

#[test]
fn test_validate_reports_shape_error_index() {
    let arch = Architecture::new(vec![
        OperatorBlock::conv(3, 8, 5, Padding::Explicit(0), 1).unwrap(),
        OperatorBlock::conv(8, 8, 5, Padding::Explicit(0), 1).unwrap(),
    ])
    .unwrap();
    // 6 -> 2 -> (2 - 5) < 0
    let err = arch.validate(ShapeState::image(3, 6, 6)).unwrap_err();
    assert_eq!(
        err,
        IrError::Shape {
            index: 1,
            source: ShapeError::NonPositive {
                op: "conv",
                dim: "height",
            },
        }
    );
}

#[test]
fn test_json_round_trip_preserves_blocks() {
    let arch = scenario_a();
    let text = arch.to_json().unwrap();
    assert!(text.contains("\"op\": \"conv\""));
    assert!(text.contains("\"padding\": \"same\""));
    assert_eq!(Architecture::from_json(&text).unwrap(), arch);
}

#[test]
fn test_json_unknown_op_becomes_opaque() {
    let text = r#"[{"op": "relu"}, {"op": "add", "filter": 64}]"#;
    let arch = Architecture::from_json(text).unwrap();
    assert_eq!(arch.blocks()[1], OperatorBlock::Opaque("add".into()));

    // Parameters of unmodeled operators are not carried through.
    let written = arch.to_json().unwrap();
    assert!(written.contains("\"op\": \"add\""));
    assert!(!written.contains("filter"));
}

#[test]
fn test_json_rejects_unknown_fields_on_known_ops() {
    let dilated = Architecture::from_json(
        r#"[{"op": "conv", "in_channels": 3, "out_channels": 8, "kernel_size": 3,
             "padding": "same", "stride": 1, "dilation": 2}]"#,
    );
    assert!(matches!(dilated, Err(IrError::Json(msg)) if msg.contains("dilation")));

    let relu = Architecture::from_json(r#"[{"op": "relu", "inplace": true}]"#);
    assert!(matches!(relu, Err(IrError::Json(msg)) if msg.contains("inplace")));

    let text = r#"{"op": "linear", "in_features": 4, "out_features": 2, "bias": 1}"#;
    let raw: json::RawBlock = serde_json::from_str(text).unwrap();
    assert_eq!(
        OperatorBlock::try_from(raw),
        Err(IrError::UnknownParam {
            op: "linear",
            field: "bias".into(),
        })
    );
}

#[test]
fn test_json_rejects_missing_and_invalid_fields() {
    let missing = Architecture::from_json(r#"[{"op": "linear", "in_features": 4}]"#);
    assert!(matches!(missing, Err(IrError::Json(msg)) if msg.contains("out_features")));

    let bad_padding = Architecture::from_json(
        r#"[{"op": "conv", "in_channels": 3, "out_channels": 8,
             "kernel_size": 3, "padding": "valid", "stride": 1}]"#,
    );
    assert!(matches!(bad_padding, Err(IrError::Json(msg)) if msg.contains("padding")));

    let zero_stride =
        Architecture::from_json(r#"[{"op": "max_pool", "kernel_size": 2, "stride": 0}]"#);
    assert!(matches!(zero_stride, Err(IrError::Json(msg)) if msg.contains("stride")));

    assert!(Architecture::from_json("[]").is_err());
}

#[test]
fn test_fingerprint_is_content_addressed() {
    let a = scenario_a();
    let b = scenario_a();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint().len(), 64);

    let other = Architecture::new(vec![OperatorBlock::Relu]).unwrap();
    assert_ne!(a.fingerprint(), other.fingerprint());
}
