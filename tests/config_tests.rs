// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_session::Config;
use camera_session::backends::camera::{SessionPreset, StillImageCodec};
use camera_session::errors::ConfigError;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.preset, SessionPreset::High);
    assert!(config.capture_audio, "Audio should be captured by default");
    assert_eq!(config.still_image_codec, StillImageCodec::Jpeg);
    assert!(
        config.lock_exposure_after_tap,
        "Exposure should lock after a tap by default"
    );
    assert!(!config.queue_name.is_empty());
}

#[test]
fn test_config_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = Config {
        preset: SessionPreset::Photo,
        capture_audio: false,
        still_image_codec: StillImageCodec::Heif,
        lock_exposure_after_tap: false,
        queue_name: "custom-queue".to_string(),
    };
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
}

#[test]
fn test_missing_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_partial_config_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "capture_audio": false }"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert!(!config.capture_audio);
    assert_eq!(config.preset, SessionPreset::High);
}

#[test]
fn test_malformed_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "not json").unwrap();

    assert!(matches!(
        Config::load_from(&path),
        Err(ConfigError::Parse(_))
    ));
}
