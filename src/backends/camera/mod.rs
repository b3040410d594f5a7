// SPDX-License-Identifier: GPL-3.0-only

//! Capture backend abstraction
//!
//! The session manager never talks to a platform capture framework directly.
//! It consumes three traits that model the primitives such frameworks expose:
//!
//! ```text
//! ┌──────────────────────┐
//! │    SessionManager    │  ← configure / start / switch / focus / expose
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │  CaptureBackend      │  ← device discovery, input/output/session factory
//! ├──────────────────────┤
//! │  CaptureSession      │  ← add/remove, begin/commit, start/stop
//! ├──────────────────────┤
//! │  CaptureDevice       │  ← capabilities, config lock, exposure observation
//! └──────────┬───────────┘
//!            │
//!            ▼
//!       ┌─────────┐
//!       │ Virtual │  ← in-memory implementation
//!       └─────────┘
//! ```

pub mod types;
pub mod virtual_camera;

pub use types::*;
pub use virtual_camera::{VirtualBackend, VirtualDevice, VirtualSessionProbe};

use std::sync::Arc;
use tracing::debug;

/// Platform device discovery and object factory
pub trait CaptureBackend: Send + Sync {
    /// Enumerate devices of a media kind, optionally filtered by position
    ///
    /// Devices are discovered fresh on every call.
    fn devices(&self, kind: MediaKind, position: Option<DevicePosition>)
    -> Vec<Arc<dyn CaptureDevice>>;

    /// The system default device for a media kind
    fn default_device(&self, kind: MediaKind) -> Option<Arc<dyn CaptureDevice>> {
        self.devices(kind, None).into_iter().next()
    }

    /// Wrap a device so it can be added to a session
    fn create_input(&self, device: Arc<dyn CaptureDevice>) -> BackendResult<DeviceInput>;

    /// Create a new output sink of the given kind
    fn create_output(&self, kind: OutputKind) -> CaptureOutput;

    /// Create a new, empty capture session
    fn create_session(&self) -> Box<dyn CaptureSession>;
}

/// A capture session hub
///
/// Implementations are only ever driven from the session queue thread.
pub trait CaptureSession: Send {
    fn preset(&self) -> SessionPreset;
    fn set_preset(&mut self, preset: SessionPreset);

    fn can_add_input(&self, input: &DeviceInput) -> bool;
    fn add_input(&mut self, input: DeviceInput);
    fn remove_input(&mut self, input: &DeviceInput);
    fn inputs(&self) -> Vec<DeviceInput>;

    fn can_add_output(&self, output: &CaptureOutput) -> bool;
    fn add_output(&mut self, output: CaptureOutput);
    fn remove_output(&mut self, output: &CaptureOutput);
    fn outputs(&self) -> Vec<CaptureOutput>;

    /// Open a configuration transaction
    ///
    /// Changes made until the matching [`commit_configuration`] are applied
    /// atomically from an observer's point of view.
    ///
    /// [`commit_configuration`]: CaptureSession::commit_configuration
    fn begin_configuration(&mut self);
    fn commit_configuration(&mut self);

    /// Start the flow of data. Blocks until the session is running.
    fn start_running(&mut self);
    /// Stop the flow of data. Blocks until the session has stopped.
    fn stop_running(&mut self);
    fn is_running(&self) -> bool;
}

/// A physical capture device (camera or microphone)
///
/// Handles are shared (`Arc`) and use interior mutability, like the
/// reference-typed device objects platform frameworks hand out. Setters must
/// only be called while the configuration lock is held; see
/// [`ConfigurationLock`].
pub trait CaptureDevice: Send + Sync {
    /// Identifier stable across discoveries
    fn unique_id(&self) -> &str;
    fn name(&self) -> &str;
    fn position(&self) -> DevicePosition;
    fn media_kind(&self) -> MediaKind;

    // ===== Capabilities =====

    fn is_focus_point_of_interest_supported(&self) -> bool;
    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool;
    fn is_exposure_point_of_interest_supported(&self) -> bool;
    fn is_exposure_mode_supported(&self, mode: ExposureMode) -> bool;

    // ===== Current state =====

    fn focus_mode(&self) -> FocusMode;
    fn focus_point_of_interest(&self) -> PointOfInterest;
    fn exposure_mode(&self) -> ExposureMode;
    fn exposure_point_of_interest(&self) -> PointOfInterest;
    fn is_adjusting_exposure(&self) -> bool;

    // ===== Configuration =====

    /// Acquire exclusive configuration access
    ///
    /// Fails when the device is busy or disconnected.
    fn lock_for_configuration(&self) -> BackendResult<()>;
    fn unlock_for_configuration(&self);

    fn set_focus_mode(&self, mode: FocusMode);
    fn set_focus_point_of_interest(&self, point: PointOfInterest);
    fn set_exposure_mode(&self, mode: ExposureMode);
    fn set_exposure_point_of_interest(&self, point: PointOfInterest);

    // ===== Observation =====

    /// Register a callback fired whenever the device reports a new
    /// "adjusting exposure" value
    ///
    /// The callback may run on any thread.
    fn observe_adjusting_exposure(&self, callback: AdjustingExposureCallback) -> ObserverToken;

    /// Remove a previously registered observer. Unknown tokens are ignored.
    fn remove_observer(&self, token: ObserverToken);
}

/// Scoped device configuration lock
///
/// Acquired with [`ConfigurationLock::acquire`] and released when dropped, so
/// every exit path (early return, `?`, panic) unlocks the device.
pub struct ConfigurationLock<'a> {
    device: &'a (dyn CaptureDevice + 'static),
}

impl<'a> ConfigurationLock<'a> {
    pub fn acquire(device: &'a (dyn CaptureDevice + 'static)) -> BackendResult<Self> {
        device.lock_for_configuration()?;
        debug!(device = %device.name(), "Acquired configuration lock");
        Ok(Self { device })
    }
}

impl std::ops::Deref for ConfigurationLock<'_> {
    type Target = dyn CaptureDevice;

    fn deref(&self) -> &Self::Target {
        self.device
    }
}

impl Drop for ConfigurationLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
        debug!(device = %self.device.name(), "Released configuration lock");
    }
}

/// Count devices of a kind, optionally filtered by position
pub fn device_count(
    backend: &dyn CaptureBackend,
    kind: MediaKind,
    position: Option<DevicePosition>,
) -> usize {
    backend.devices(kind, position).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_released_on_drop() {
        let device = VirtualDevice::camera("Back Camera", DevicePosition::Back);
        {
            let lock = ConfigurationLock::acquire(device.as_ref()).unwrap();
            lock.set_focus_mode(FocusMode::AutoFocus);
            assert!(device.is_locked());
        }
        assert!(!device.is_locked());
        assert_eq!(device.unlocked_writes(), 0);
    }

    #[test]
    fn test_lock_failure_leaves_device_unlocked() {
        let device = VirtualDevice::camera("Back Camera", DevicePosition::Back);
        device.set_lock_failure(Some(BackendError::Busy("in use".to_string())));

        let result = ConfigurationLock::acquire(device.as_ref());
        assert!(matches!(result, Err(BackendError::Busy(_))));
        assert!(!device.is_locked());
    }

    #[test]
    fn test_device_count_filters_position() {
        let backend = VirtualBackend::new()
            .with_device(VirtualDevice::camera("Back Camera", DevicePosition::Back))
            .with_device(VirtualDevice::camera("Front Camera", DevicePosition::Front))
            .with_device(VirtualDevice::microphone("Microphone"));

        assert_eq!(device_count(&backend, MediaKind::Video, None), 2);
        assert_eq!(
            device_count(&backend, MediaKind::Video, Some(DevicePosition::Front)),
            1
        );
        assert_eq!(device_count(&backend, MediaKind::Audio, None), 1);
    }
}
