// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture backend abstraction

//! Shared types for capture backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::CaptureDevice;

/// Physical position of a capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevicePosition {
    /// Facing the user (selfie camera)
    Front,
    /// Facing away from the user
    Back,
    /// No fixed position (external webcams, microphones)
    Unspecified,
}

impl DevicePosition {
    /// The position on the other side of the device
    ///
    /// `Unspecified` has no opposite; the back camera is used as the
    /// fallback target, matching how a default camera is picked.
    pub fn opposite(&self) -> Self {
        match self {
            DevicePosition::Front | DevicePosition::Unspecified => DevicePosition::Back,
            DevicePosition::Back => DevicePosition::Front,
        }
    }
}

impl std::fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevicePosition::Front => write!(f, "front"),
            DevicePosition::Back => write!(f, "back"),
            DevicePosition::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Kind of media a device produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Focus mode of a camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FocusMode {
    /// Lens position is fixed
    Locked,
    /// Single-shot autofocus, then hold
    AutoFocus,
    /// Continuously refocus as the scene changes
    ContinuousAutoFocus,
}

/// Exposure mode of a camera device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureMode {
    /// Exposure is held at its current value
    Locked,
    /// Single-shot auto exposure, then hold
    AutoExpose,
    /// Continuously adjust exposure as the scene changes
    ContinuousAutoExposure,
}

/// Session resolution preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionPreset {
    Low,
    Medium,
    /// Highest quality suitable for video (default)
    #[default]
    High,
    /// Full sensor resolution for still photos
    Photo,
}

impl std::fmt::Display for SessionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPreset::Low => write!(f, "low"),
            SessionPreset::Medium => write!(f, "medium"),
            SessionPreset::High => write!(f, "high"),
            SessionPreset::Photo => write!(f, "photo"),
        }
    }
}

/// Normalized point of interest for focus and exposure metering
///
/// `(0, 0)` is the top-left of the unrotated sensor image, `(1, 1)` the
/// bottom-right and `(0.5, 0.5)` the center. Coordinates are clamped into
/// the unit square on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub x: f64,
    pub y: f64,
}

impl PointOfInterest {
    /// Center of the frame
    pub const CENTER: PointOfInterest = PointOfInterest { x: 0.5, y: 0.5 };

    /// Create a point, clamping both coordinates into `[0, 1]`
    ///
    /// NaN coordinates fall back to the center.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    /// Convert a tap in view space into a normalized point
    ///
    /// Returns the center for a degenerate (zero-sized) view.
    pub fn from_view(x: f64, y: f64, width: f64, height: f64) -> Self {
        if width <= 0.0 || height <= 0.0 {
            return Self::CENTER;
        }
        Self::new(x / width, y / height)
    }
}

impl Default for PointOfInterest {
    fn default() -> Self {
        Self::CENTER
    }
}

impl std::fmt::Display for PointOfInterest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Stable identity of a wrapped device input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(pub u64);

/// Stable identity of an output sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u64);

/// Token returned when registering an adjusting-exposure observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(pub u64);

/// Callback invoked with the device's new "adjusting exposure" value
pub type AdjustingExposureCallback = Box<dyn Fn(bool) + Send + Sync>;

/// A capture device wrapped for use as a session input
#[derive(Clone)]
pub struct DeviceInput {
    id: InputId,
    device: Arc<dyn CaptureDevice>,
}

impl DeviceInput {
    pub fn new(id: InputId, device: Arc<dyn CaptureDevice>) -> Self {
        Self { id, device }
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn device(&self) -> &Arc<dyn CaptureDevice> {
        &self.device
    }

    pub fn media_kind(&self) -> MediaKind {
        self.device.media_kind()
    }
}

impl PartialEq for DeviceInput {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceInput {}

impl std::fmt::Debug for DeviceInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInput")
            .field("id", &self.id)
            .field("device", &self.device.unique_id())
            .field("kind", &self.device.media_kind())
            .finish()
    }
}

/// Codec used by the still image output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StillImageCodec {
    #[default]
    Jpeg,
    Heif,
}

/// Kind of output sink attached to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Still photo capture
    StillImage(StillImageCodec),
    /// Movie file recording
    MovieFile,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::StillImage(codec) => write!(f, "still image ({:?})", codec),
            OutputKind::MovieFile => write!(f, "movie file"),
        }
    }
}

/// An output sink consuming frames from a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOutput {
    pub id: OutputId,
    pub kind: OutputKind,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Device no longer exists
    DeviceNotFound(String),
    /// Device is in use by another client
    Busy(String),
    /// Device was unplugged or revoked
    Disconnected(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::Busy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::Disconnected(msg) => write!(f, "Device disconnected: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_is_clamped() {
        let point = PointOfInterest::new(-0.2, 1.7);
        assert_eq!(point, PointOfInterest { x: 0.0, y: 1.0 });
    }

    #[test]
    fn test_nan_point_falls_back_to_center() {
        let point = PointOfInterest::new(f64::NAN, 0.25);
        assert_eq!(point.x, 0.5);
        assert_eq!(point.y, 0.25);
    }

    #[test]
    fn test_point_from_view() {
        let point = PointOfInterest::from_view(160.0, 360.0, 320.0, 480.0);
        assert_eq!(point, PointOfInterest { x: 0.5, y: 0.75 });
        assert_eq!(
            PointOfInterest::from_view(10.0, 10.0, 0.0, 480.0),
            PointOfInterest::CENTER
        );
    }

    #[test]
    fn test_opposite_position() {
        assert_eq!(DevicePosition::Front.opposite(), DevicePosition::Back);
        assert_eq!(DevicePosition::Back.opposite(), DevicePosition::Front);
    }
}
