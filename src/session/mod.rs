// SPDX-License-Identifier: GPL-3.0-only

//! Camera session lifecycle manager
//!
//! [`SessionManager`] acquires capture devices, wires them into a capture
//! session and mutates focus, exposure and camera selection while the session
//! runs. All session and device mutation happens on one [`SessionQueue`]
//! worker; the manager itself is a thin front that submits jobs.
//!
//! ```text
//!   caller thread                 session queue thread
//!   ─────────────                 ────────────────────
//!   configure() ──── run ───────▶ SessionState::configure
//!   start()     ──── dispatch ──▶ SessionState::start
//!   expose_at_point() ── run ───▶ lock, set point, watch ─┐
//!                                                         │ device thread
//!                                  complete_exposure_watch ◀─ "settled"
//! ```

pub mod events;
pub mod exposure;
pub mod queue;

pub use events::{EventReceiver, SessionEvent};
pub use exposure::ExposureLockState;
pub use queue::{QueueHandle, SessionQueue};

use crate::backends::camera::{
    BackendError, CaptureBackend, CaptureDevice, CaptureOutput, CaptureSession,
    ConfigurationLock, DeviceInput, DevicePosition, ExposureMode, FocusMode, MediaKind,
    OutputKind, PointOfInterest, device_count,
};
use crate::config::Config;
use crate::constants::RESET_POINT;
use crate::errors::{SessionError, SessionResult};
use events::EventSink;
use exposure::ExposureLockTracker;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one capture session
///
/// Dropping the manager stops a running session, deregisters any pending
/// exposure watch and joins the session queue.
pub struct SessionManager {
    backend: Arc<dyn CaptureBackend>,
    queue: SessionQueue<SessionState>,
}

impl SessionManager {
    /// Create a manager and its session queue. The session itself is created
    /// by [`configure`](SessionManager::configure).
    pub fn new(backend: Arc<dyn CaptureBackend>, config: Config) -> SessionResult<Self> {
        let queue_name = config.queue_name.clone();
        let state = SessionState::new(Arc::clone(&backend), config);
        let queue = SessionQueue::spawn(&queue_name, state).map_err(|e| {
            SessionError::Backend(BackendError::Other(format!(
                "Spawn session queue: {}",
                e
            )))
        })?;

        Ok(Self { backend, queue })
    }

    /// Create the session and wire the default camera, microphone
    /// (best-effort), still image output and movie output
    ///
    /// On failure nothing stays attached and the session is discarded.
    /// Reconfiguring replaces the previous session.
    pub fn configure(&self) -> SessionResult<()> {
        self.queue.run(|state| state.configure())?
    }

    /// Start the session without blocking. No-op if already running.
    pub fn start(&self) {
        self.queue.dispatch(|state| state.start());
    }

    /// Stop the session without blocking. No-op if not running.
    pub fn stop(&self) {
        self.queue.dispatch(|state| state.stop());
    }

    /// Whether the session is running, after all previously submitted work
    pub fn is_running(&self) -> bool {
        self.queue.run(|state| state.is_running()).unwrap_or(false)
    }

    /// Number of devices of `kind` at `position` (`None` = any position)
    pub fn device_count(&self, kind: MediaKind, position: Option<DevicePosition>) -> usize {
        device_count(self.backend.as_ref(), kind, position)
    }

    /// True when more than one camera is available
    pub fn can_switch_cameras(&self) -> bool {
        self.device_count(MediaKind::Video, None) > 1
    }

    /// Device bound to the active video input
    pub fn active_camera(&self) -> Option<Arc<dyn CaptureDevice>> {
        self.queue.run(|state| state.active_camera()).ok().flatten()
    }

    /// Camera at the opposite position, which a switch would move to
    pub fn inactive_camera(&self) -> Option<Arc<dyn CaptureDevice>> {
        self.queue.run(|state| state.inactive_camera()).ok().flatten()
    }

    /// Swap the active camera for the inactive one
    ///
    /// Returns false when no switch happened; the previous input is then
    /// still attached.
    pub fn switch_cameras(&self) -> bool {
        self.queue
            .run(|state| state.switch_cameras())
            .unwrap_or(false)
    }

    /// Single-shot autofocus at a normalized point
    pub fn focus_at_point(&self, point: PointOfInterest) -> SessionResult<()> {
        self.queue.run(move |state| state.focus_at_point(point))?
    }

    /// Single-shot auto exposure at a normalized point, locking exposure once
    /// the device settles (when supported and enabled)
    pub fn expose_at_point(&self, point: PointOfInterest) -> SessionResult<()> {
        let handle = self.queue.handle();
        self.queue
            .run(move |state| state.expose_at_point(point, handle))?
    }

    /// Return focus and exposure to continuous auto mode at the center
    pub fn reset_focus_and_exposure(&self) -> SessionResult<()> {
        self.queue.run(|state| state.reset_focus_and_exposure())?
    }

    pub fn exposure_lock_state(&self) -> ExposureLockState {
        self.queue
            .run(|state| state.exposure.state())
            .unwrap_or_default()
    }

    /// Receive events for asynchronous outcomes (start/stop, deferred
    /// exposure lock, configuration failures)
    pub fn subscribe(&self) -> SessionResult<EventReceiver> {
        self.queue.run(|state| state.events.subscribe())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("queue", &self.queue.name())
            .finish()
    }
}

/// Inputs and outputs attached during `configure`
#[derive(Default)]
struct Topology {
    video_input: Option<DeviceInput>,
    audio_input: Option<DeviceInput>,
    outputs: Vec<CaptureOutput>,
}

impl Topology {
    fn detach_from(self, session: &mut dyn CaptureSession) {
        for output in &self.outputs {
            session.remove_output(output);
        }
        if let Some(input) = &self.audio_input {
            session.remove_input(input);
        }
        if let Some(input) = &self.video_input {
            session.remove_input(input);
        }
    }
}

/// Session state, owned by the queue thread
pub(crate) struct SessionState {
    backend: Arc<dyn CaptureBackend>,
    config: Config,
    session: Option<Box<dyn CaptureSession>>,
    active_input: Option<DeviceInput>,
    exposure: ExposureLockTracker,
    events: EventSink,
}

impl SessionState {
    fn new(backend: Arc<dyn CaptureBackend>, config: Config) -> Self {
        Self {
            backend,
            config,
            session: None,
            active_input: None,
            exposure: ExposureLockTracker::default(),
            events: EventSink::default(),
        }
    }

    // ===== Lifecycle =====

    fn configure(&mut self) -> SessionResult<()> {
        self.teardown();

        info!(preset = %self.config.preset, "Configuring capture session");

        let mut session = self.backend.create_session();
        let mut topology = Topology::default();

        session.begin_configuration();
        let result = self.attach(session.as_mut(), &mut topology);
        if result.is_err() {
            topology.detach_from(session.as_mut());
        } else {
            self.active_input = topology.video_input.clone();
        }
        session.commit_configuration();

        match result {
            Ok(()) => {
                self.session = Some(session);
                self.events.emit(SessionEvent::Configured);
                info!("Capture session configured");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Capture session configuration failed");
                self.events
                    .emit(SessionEvent::DeviceConfigurationFailed(e.clone()));
                Err(e)
            }
        }
    }

    fn attach(
        &self,
        session: &mut dyn CaptureSession,
        topology: &mut Topology,
    ) -> SessionResult<()> {
        session.set_preset(self.config.preset);

        let camera = self
            .backend
            .default_device(MediaKind::Video)
            .ok_or(SessionError::DeviceUnavailable(MediaKind::Video))?;
        let camera_name = camera.name().to_string();
        let video_input = self.backend.create_input(camera)?;
        if !session.can_add_input(&video_input) {
            return Err(SessionError::CannotAddInput(camera_name));
        }
        session.add_input(video_input.clone());
        topology.video_input = Some(video_input);
        debug!(device = %camera_name, "Video input attached");

        if self.config.capture_audio {
            topology.audio_input = self.attach_audio(session);
        }

        let still_kind = OutputKind::StillImage(self.config.still_image_codec);
        for kind in [still_kind, OutputKind::MovieFile] {
            let output = self.backend.create_output(kind);
            if !session.can_add_output(&output) {
                return Err(SessionError::CannotAddOutput(kind));
            }
            session.add_output(output);
            topology.outputs.push(output);
            debug!(output = %kind, "Output attached");
        }

        Ok(())
    }

    /// Best-effort: a session without audio still captures video
    fn attach_audio(&self, session: &mut dyn CaptureSession) -> Option<DeviceInput> {
        let Some(microphone) = self.backend.default_device(MediaKind::Audio) else {
            warn!("No audio device, capturing video only");
            return None;
        };
        let name = microphone.name().to_string();

        let input = match self.backend.create_input(microphone) {
            Ok(input) => input,
            Err(e) => {
                warn!(device = %name, error = %e, "Cannot open audio device, capturing video only");
                return None;
            }
        };
        if !session.can_add_input(&input) {
            warn!(device = %name, "Session rejected audio input, capturing video only");
            return None;
        }

        session.add_input(input.clone());
        debug!(device = %name, "Audio input attached");
        Some(input)
    }

    fn start(&mut self) {
        let Some(session) = self.session.as_mut() else {
            warn!("Start requested before the session was configured");
            self.events.emit(SessionEvent::DeviceConfigurationFailed(
                SessionError::NotConfigured,
            ));
            return;
        };
        if session.is_running() {
            debug!("Session already running");
            return;
        }

        session.start_running();
        info!("Capture session started");
        self.events.emit(SessionEvent::Started);
    }

    fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.is_running() {
            debug!("Session already stopped");
            return;
        }

        session.stop_running();
        info!("Capture session stopped");
        self.events.emit(SessionEvent::Stopped);
    }

    fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.is_running())
    }

    /// Release the current session, if any
    fn teardown(&mut self) {
        self.exposure.cancel();
        self.stop();
        if self.session.take().is_some() {
            debug!("Previous capture session released");
        }
        self.active_input = None;
    }

    // ===== Camera selection =====

    fn active_camera(&self) -> Option<Arc<dyn CaptureDevice>> {
        self.active_input
            .as_ref()
            .map(|input| Arc::clone(input.device()))
    }

    fn inactive_camera(&self) -> Option<Arc<dyn CaptureDevice>> {
        let cameras = self.backend.devices(MediaKind::Video, None);
        if cameras.len() < 2 {
            return None;
        }

        let Some(active) = self.active_camera() else {
            return self
                .backend
                .devices(MediaKind::Video, Some(DevicePosition::Back))
                .into_iter()
                .next();
        };

        let wanted = active.position().opposite();
        cameras
            .into_iter()
            .find(|camera| camera.position() == wanted)
    }

    fn switch_cameras(&mut self) -> bool {
        if self.session.is_none() || self.backend.devices(MediaKind::Video, None).len() < 2 {
            debug!("Camera switch not possible");
            return false;
        }
        let Some(current) = self.active_input.clone() else {
            debug!("No active camera to switch from");
            return false;
        };
        let Some(target) = self.inactive_camera() else {
            debug!("No camera to switch to");
            return false;
        };

        let target_name = target.name().to_string();
        let target_position = target.position();
        info!(device = %target_name, "Switching camera");

        let new_input = match self.backend.create_input(target) {
            Ok(input) => input,
            Err(e) => {
                warn!(device = %target_name, error = %e, "Cannot open camera for switch");
                self.events.emit(SessionEvent::CameraSwitchFailed);
                return false;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return false;
        };

        session.begin_configuration();
        session.remove_input(&current);
        let switched = if session.can_add_input(&new_input) {
            session.add_input(new_input.clone());
            true
        } else {
            session.add_input(current);
            false
        };
        session.commit_configuration();

        if switched {
            self.exposure.cancel();
            self.active_input = Some(new_input);
            info!(device = %target_name, position = %target_position, "Camera switched");
            self.events.emit(SessionEvent::CameraSwitched {
                position: target_position,
            });
        } else {
            warn!(device = %target_name, "Session rejected camera, restored previous input");
            self.events.emit(SessionEvent::CameraSwitchFailed);
        }
        switched
    }

    // ===== Focus & exposure =====

    fn lock_failed(&mut self, device: &dyn CaptureDevice, err: BackendError) -> SessionError {
        warn!(device = %device.name(), error = %err, "Configuration lock failed");
        let err = SessionError::ConfigurationLockFailed(err.to_string());
        self.events
            .emit(SessionEvent::DeviceConfigurationFailed(err.clone()));
        err
    }

    fn focus_at_point(&mut self, point: PointOfInterest) -> SessionResult<()> {
        let Some(device) = self.active_camera() else {
            return Ok(());
        };
        if !device.is_focus_point_of_interest_supported()
            || !device.is_focus_mode_supported(FocusMode::AutoFocus)
        {
            debug!(device = %device.name(), "Focus point not supported");
            return Ok(());
        }

        let lock = ConfigurationLock::acquire(device.as_ref())
            .map_err(|e| self.lock_failed(device.as_ref(), e))?;
        lock.set_focus_point_of_interest(point);
        lock.set_focus_mode(FocusMode::AutoFocus);

        debug!(device = %device.name(), %point, "Focus point set");
        Ok(())
    }

    fn expose_at_point(
        &mut self,
        point: PointOfInterest,
        handle: QueueHandle<SessionState>,
    ) -> SessionResult<()> {
        let Some(device) = self.active_camera() else {
            return Ok(());
        };
        if !device.is_exposure_point_of_interest_supported()
            || !device.is_exposure_mode_supported(ExposureMode::AutoExpose)
        {
            debug!(device = %device.name(), "Exposure point not supported");
            return Ok(());
        }

        let lock = ConfigurationLock::acquire(device.as_ref())
            .map_err(|e| self.lock_failed(device.as_ref(), e))?;
        lock.set_exposure_point_of_interest(point);
        lock.set_exposure_mode(ExposureMode::AutoExpose);

        if self.config.lock_exposure_after_tap
            && device.is_exposure_mode_supported(ExposureMode::Locked)
        {
            self.exposure.watch(&device, move |generation| {
                handle.dispatch(move |state| state.complete_exposure_watch(generation));
            });
        } else {
            self.exposure.cancel();
        }

        debug!(device = %device.name(), %point, "Exposure point set");
        Ok(())
    }

    /// Runs on the queue after the device reported it stopped adjusting
    fn complete_exposure_watch(&mut self, generation: u64) {
        let Some(device) = self.exposure.pending_device(generation) else {
            debug!(generation, "Stale exposure notification ignored");
            return;
        };
        if device.is_adjusting_exposure() {
            // Rearm before the second read so a report landing in between is
            // either seen here or forwarded again
            self.exposure.rearm(generation);
            if device.is_adjusting_exposure() {
                return;
            }
        }
        if !device.is_exposure_mode_supported(ExposureMode::Locked) {
            self.exposure.finish(false);
            return;
        }

        match ConfigurationLock::acquire(device.as_ref()) {
            Ok(lock) => {
                lock.set_exposure_mode(ExposureMode::Locked);
                drop(lock);
                self.exposure.finish(true);
                info!(device = %device.name(), "Exposure locked");
                self.events.emit(SessionEvent::ExposureLocked);
            }
            Err(e) => {
                self.exposure.finish(false);
                self.lock_failed(device.as_ref(), e);
            }
        }
    }

    fn reset_focus_and_exposure(&mut self) -> SessionResult<()> {
        let Some(device) = self.active_camera() else {
            return Ok(());
        };

        let can_reset_focus = device.is_focus_point_of_interest_supported()
            && device.is_focus_mode_supported(FocusMode::ContinuousAutoFocus);
        let can_reset_exposure = device.is_exposure_point_of_interest_supported()
            && device.is_exposure_mode_supported(ExposureMode::ContinuousAutoExposure);

        // A pending watch must not lock exposure after a reset, even a failed one
        self.exposure.cancel();

        if can_reset_focus || can_reset_exposure {
            let lock = ConfigurationLock::acquire(device.as_ref())
                .map_err(|e| self.lock_failed(device.as_ref(), e))?;

            if can_reset_focus {
                lock.set_focus_mode(FocusMode::ContinuousAutoFocus);
                lock.set_focus_point_of_interest(RESET_POINT);
            }
            if can_reset_exposure {
                lock.set_exposure_mode(ExposureMode::ContinuousAutoExposure);
                lock.set_exposure_point_of_interest(RESET_POINT);
            }
        }

        debug!(
            device = %device.name(),
            focus = can_reset_focus,
            exposure = can_reset_exposure,
            "Focus and exposure reset"
        );
        Ok(())
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.teardown();
    }
}
