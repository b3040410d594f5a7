// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use crate::backends::camera::PointOfInterest;

/// Name of the thread that serializes session and device mutation
pub const SESSION_QUEUE_NAME: &str = "camera-session-queue";

/// Directory (under the user config dir) holding `config.json`
pub const CONFIG_DIR_NAME: &str = "camera-session";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Point that focus and exposure return to on reset
pub const RESET_POINT: PointOfInterest = PointOfInterest::CENTER;
