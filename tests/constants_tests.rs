// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camera_session::backends::camera::PointOfInterest;
use camera_session::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, RESET_POINT, SESSION_QUEUE_NAME,
};

#[test]
fn test_reset_point_is_center() {
    assert_eq!(RESET_POINT, PointOfInterest::new(0.5, 0.5));
}

#[test]
fn test_names_are_usable() {
    assert!(!SESSION_QUEUE_NAME.is_empty());
    assert!(!CONFIG_DIR_NAME.contains('/'));
    assert!(CONFIG_FILE_NAME.ends_with(".json"));
}
