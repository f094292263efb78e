//! Unit tests for VmConfig

use core_types::VmConfig;

#[test]
fn test_partial_json_keeps_defaults() {
    let config = VmConfig::from_json(r#"{ "max_frames": 8, "link_hidden_natives": true }"#).unwrap();
    assert_eq!(config.max_frames, 8);
    assert!(config.link_hidden_natives);
    assert_eq!(config.heap_limit, VmConfig::default().heap_limit);
}

#[test]
fn test_invalid_json_rejected() {
    assert!(VmConfig::from_json("{ max_frames: }").is_err());
}

#[test]
fn test_null_time_slice() {
    let config = VmConfig::from_json(r#"{ "time_slice": null }"#).unwrap();
    assert_eq!(config.time_slice, None);
}
