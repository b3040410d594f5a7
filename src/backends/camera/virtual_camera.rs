// SPDX-License-Identifier: GPL-3.0-only

//! Virtual capture backend
//!
//! An in-memory implementation of the capture traits. Devices, session
//! policies and device failures are scriptable, which makes it the backend of
//! choice for tests and for the diagnostic CLI on machines without cameras.
//!
//! Behaves like a typical platform framework where it matters:
//! - a session accepts at most one video input and one audio input
//! - topology changes inside `begin_configuration`/`commit_configuration` are
//!   published to observers only on commit
//! - device setters are expected under the configuration lock (violations
//!   are counted, not rejected)
//! - adjusting-exposure observers fire on every reported value, even if it
//!   did not change

use super::types::*;
use super::{CaptureBackend, CaptureDevice, CaptureSession};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===== Devices =====

#[derive(Debug, Clone)]
struct Capabilities {
    focus_point_of_interest: bool,
    focus_modes: HashSet<FocusMode>,
    exposure_point_of_interest: bool,
    exposure_modes: HashSet<ExposureMode>,
}

impl Capabilities {
    fn full_camera() -> Self {
        Self {
            focus_point_of_interest: true,
            focus_modes: [
                FocusMode::Locked,
                FocusMode::AutoFocus,
                FocusMode::ContinuousAutoFocus,
            ]
            .into_iter()
            .collect(),
            exposure_point_of_interest: true,
            exposure_modes: [
                ExposureMode::Locked,
                ExposureMode::AutoExpose,
                ExposureMode::ContinuousAutoExposure,
            ]
            .into_iter()
            .collect(),
        }
    }

    fn none() -> Self {
        Self {
            focus_point_of_interest: false,
            focus_modes: HashSet::new(),
            exposure_point_of_interest: false,
            exposure_modes: HashSet::new(),
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    focus_mode: FocusMode,
    focus_point: PointOfInterest,
    exposure_mode: ExposureMode,
    exposure_point: PointOfInterest,
    adjusting_exposure: bool,
    locked: bool,
    lock_count: usize,
    unlocked_writes: usize,
    lock_failure: Option<BackendError>,
    settle_during_next_check: bool,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            focus_mode: FocusMode::ContinuousAutoFocus,
            focus_point: PointOfInterest::CENTER,
            exposure_mode: ExposureMode::ContinuousAutoExposure,
            exposure_point: PointOfInterest::CENTER,
            adjusting_exposure: false,
            locked: false,
            lock_count: 0,
            unlocked_writes: 0,
            lock_failure: None,
            settle_during_next_check: false,
        }
    }
}

type SharedCallback = Arc<AdjustingExposureCallback>;

/// Scriptable in-memory camera or microphone
pub struct VirtualDevice {
    unique_id: String,
    name: String,
    position: DevicePosition,
    kind: MediaKind,
    capabilities: Mutex<Capabilities>,
    state: Mutex<DeviceState>,
    observers: Mutex<Vec<(ObserverToken, SharedCallback)>>,
    next_token: AtomicU64,
    removed_observers: AtomicUsize,
}

impl VirtualDevice {
    fn new(name: &str, position: DevicePosition, kind: MediaKind, caps: Capabilities) -> Self {
        let unique_id = format!(
            "virtual:{}:{}",
            kind,
            name.to_lowercase().replace(' ', "-")
        );
        Self {
            unique_id,
            name: name.to_string(),
            position,
            kind,
            capabilities: Mutex::new(caps),
            state: Mutex::new(DeviceState::default()),
            observers: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
            removed_observers: AtomicUsize::new(0),
        }
    }

    /// A camera supporting every focus and exposure feature
    pub fn camera(name: &str, position: DevicePosition) -> Arc<Self> {
        Arc::new(Self::new(
            name,
            position,
            MediaKind::Video,
            Capabilities::full_camera(),
        ))
    }

    /// A microphone (no focus or exposure controls)
    pub fn microphone(name: &str) -> Arc<Self> {
        Arc::new(Self::new(
            name,
            DevicePosition::Unspecified,
            MediaKind::Audio,
            Capabilities::none(),
        ))
    }

    // ===== Scripting =====

    pub fn set_focus_point_supported(&self, supported: bool) {
        lock(&self.capabilities).focus_point_of_interest = supported;
    }

    pub fn set_exposure_point_supported(&self, supported: bool) {
        lock(&self.capabilities).exposure_point_of_interest = supported;
    }

    pub fn set_focus_mode_supported(&self, mode: FocusMode, supported: bool) {
        let mut caps = lock(&self.capabilities);
        if supported {
            caps.focus_modes.insert(mode);
        } else {
            caps.focus_modes.remove(&mode);
        }
    }

    pub fn set_exposure_mode_supported(&self, mode: ExposureMode, supported: bool) {
        let mut caps = lock(&self.capabilities);
        if supported {
            caps.exposure_modes.insert(mode);
        } else {
            caps.exposure_modes.remove(&mode);
        }
    }

    /// Make subsequent `lock_for_configuration` calls fail (`None` restores)
    pub fn set_lock_failure(&self, failure: Option<BackendError>) {
        lock(&self.state).lock_failure = failure;
    }

    /// The next `is_adjusting_exposure` read still sees the device adjusting,
    /// but exposure settles (and observers are notified) while it is read
    pub fn settle_during_next_adjusting_check(&self) {
        lock(&self.state).settle_during_next_check = true;
    }

    /// Report a new "adjusting exposure" value and notify every observer
    ///
    /// Observers run on the calling thread, after internal locks are released.
    pub fn report_adjusting_exposure(&self, adjusting: bool) {
        lock(&self.state).adjusting_exposure = adjusting;

        let callbacks: Vec<SharedCallback> = lock(&self.observers)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        trace!(
            device = %self.name,
            adjusting,
            observers = callbacks.len(),
            "Reporting exposure adjustment"
        );

        for callback in callbacks {
            callback(adjusting);
        }
    }

    // ===== Inspection =====

    pub fn is_locked(&self) -> bool {
        lock(&self.state).locked
    }

    /// Number of successful configuration lock acquisitions
    pub fn lock_count(&self) -> usize {
        lock(&self.state).lock_count
    }

    /// Number of setter calls made without holding the configuration lock
    pub fn unlocked_writes(&self) -> usize {
        lock(&self.state).unlocked_writes
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Number of observers removed through `remove_observer`
    pub fn removed_observer_count(&self) -> usize {
        self.removed_observers.load(Ordering::SeqCst)
    }

    fn write_state(&self, apply: impl FnOnce(&mut DeviceState)) {
        let mut state = lock(&self.state);
        if !state.locked {
            state.unlocked_writes += 1;
        }
        apply(&mut state);
    }
}

impl CaptureDevice for VirtualDevice {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> DevicePosition {
        self.position
    }

    fn media_kind(&self) -> MediaKind {
        self.kind
    }

    fn is_focus_point_of_interest_supported(&self) -> bool {
        lock(&self.capabilities).focus_point_of_interest
    }

    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool {
        lock(&self.capabilities).focus_modes.contains(&mode)
    }

    fn is_exposure_point_of_interest_supported(&self) -> bool {
        lock(&self.capabilities).exposure_point_of_interest
    }

    fn is_exposure_mode_supported(&self, mode: ExposureMode) -> bool {
        lock(&self.capabilities).exposure_modes.contains(&mode)
    }

    fn focus_mode(&self) -> FocusMode {
        lock(&self.state).focus_mode
    }

    fn focus_point_of_interest(&self) -> PointOfInterest {
        lock(&self.state).focus_point
    }

    fn exposure_mode(&self) -> ExposureMode {
        lock(&self.state).exposure_mode
    }

    fn exposure_point_of_interest(&self) -> PointOfInterest {
        lock(&self.state).exposure_point
    }

    fn is_adjusting_exposure(&self) -> bool {
        let (adjusting, settle) = {
            let mut state = lock(&self.state);
            let settle = std::mem::take(&mut state.settle_during_next_check);
            (state.adjusting_exposure || settle, settle)
        };
        if settle {
            self.report_adjusting_exposure(false);
        }
        adjusting
    }

    fn lock_for_configuration(&self) -> BackendResult<()> {
        let mut state = lock(&self.state);
        if let Some(failure) = state.lock_failure.clone() {
            return Err(failure);
        }
        if state.locked {
            return Err(BackendError::Busy(format!(
                "{} is already locked for configuration",
                self.name
            )));
        }
        state.locked = true;
        state.lock_count += 1;
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        lock(&self.state).locked = false;
    }

    fn set_focus_mode(&self, mode: FocusMode) {
        self.write_state(|state| state.focus_mode = mode);
    }

    fn set_focus_point_of_interest(&self, point: PointOfInterest) {
        self.write_state(|state| state.focus_point = point);
    }

    fn set_exposure_mode(&self, mode: ExposureMode) {
        self.write_state(|state| {
            state.exposure_mode = mode;
            // Metering restarts whenever an automatic mode is (re)selected
            if mode != ExposureMode::Locked {
                state.adjusting_exposure = true;
            }
        });
    }

    fn set_exposure_point_of_interest(&self, point: PointOfInterest) {
        self.write_state(|state| state.exposure_point = point);
    }

    fn observe_adjusting_exposure(&self, callback: AdjustingExposureCallback) -> ObserverToken {
        let token = ObserverToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        lock(&self.observers).push((token, Arc::new(callback)));
        debug!(device = %self.name, ?token, "Registered exposure observer");
        token
    }

    fn remove_observer(&self, token: ObserverToken) {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != token);
        if observers.len() < before {
            self.removed_observers.fetch_add(1, Ordering::SeqCst);
            debug!(device = %self.name, ?token, "Removed exposure observer");
        }
    }
}

impl std::fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("unique_id", &self.unique_id)
            .field("position", &self.position)
            .field("kind", &self.kind)
            .finish()
    }
}

// ===== Sessions =====

/// Topology rules shared by all sessions of a backend
#[derive(Debug, Default)]
struct SessionPolicy {
    rejected_devices: HashSet<String>,
    rejected_outputs: HashSet<OutputKind>,
}

#[derive(Debug, Default)]
struct SessionRecord {
    preset: SessionPreset,
    inputs: Vec<DeviceInput>,
    outputs: Vec<CaptureOutput>,
    published_inputs: Vec<DeviceInput>,
    configuration_depth: u32,
    running: bool,
    start_calls: usize,
    stop_calls: usize,
    begin_calls: usize,
    commit_calls: usize,
}

impl SessionRecord {
    fn publish_if_idle(&mut self) {
        if self.configuration_depth == 0 {
            self.published_inputs = self.inputs.clone();
        }
    }
}

struct VirtualSession {
    record: Arc<Mutex<SessionRecord>>,
    policy: Arc<Mutex<SessionPolicy>>,
}

impl CaptureSession for VirtualSession {
    fn preset(&self) -> SessionPreset {
        lock(&self.record).preset
    }

    fn set_preset(&mut self, preset: SessionPreset) {
        lock(&self.record).preset = preset;
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        if lock(&self.policy)
            .rejected_devices
            .contains(input.device().unique_id())
        {
            return false;
        }
        let record = lock(&self.record);
        !record
            .inputs
            .iter()
            .any(|existing| existing == input || existing.media_kind() == input.media_kind())
    }

    fn add_input(&mut self, input: DeviceInput) {
        let mut record = lock(&self.record);
        debug!(device = %input.device().name(), "Virtual session: input added");
        record.inputs.push(input);
        record.publish_if_idle();
    }

    fn remove_input(&mut self, input: &DeviceInput) {
        let mut record = lock(&self.record);
        record.inputs.retain(|existing| existing != input);
        record.publish_if_idle();
    }

    fn inputs(&self) -> Vec<DeviceInput> {
        lock(&self.record).inputs.clone()
    }

    fn can_add_output(&self, output: &CaptureOutput) -> bool {
        if lock(&self.policy).rejected_outputs.contains(&output.kind) {
            return false;
        }
        !lock(&self.record)
            .outputs
            .iter()
            .any(|existing| existing.id == output.id)
    }

    fn add_output(&mut self, output: CaptureOutput) {
        lock(&self.record).outputs.push(output);
    }

    fn remove_output(&mut self, output: &CaptureOutput) {
        lock(&self.record)
            .outputs
            .retain(|existing| existing.id != output.id);
    }

    fn outputs(&self) -> Vec<CaptureOutput> {
        lock(&self.record).outputs.clone()
    }

    fn begin_configuration(&mut self) {
        let mut record = lock(&self.record);
        record.configuration_depth += 1;
        record.begin_calls += 1;
    }

    fn commit_configuration(&mut self) {
        let mut record = lock(&self.record);
        record.configuration_depth = record.configuration_depth.saturating_sub(1);
        record.commit_calls += 1;
        record.publish_if_idle();
    }

    fn start_running(&mut self) {
        let mut record = lock(&self.record);
        record.start_calls += 1;
        record.running = true;
    }

    fn stop_running(&mut self) {
        let mut record = lock(&self.record);
        record.stop_calls += 1;
        record.running = false;
    }

    fn is_running(&self) -> bool {
        lock(&self.record).running
    }
}

/// Read-only view of a virtual session, for inspection from outside the
/// session queue
#[derive(Clone)]
pub struct VirtualSessionProbe {
    record: Arc<Mutex<SessionRecord>>,
}

impl VirtualSessionProbe {
    pub fn preset(&self) -> SessionPreset {
        lock(&self.record).preset
    }

    /// Unique ids of the devices currently bound as inputs
    pub fn input_device_ids(&self) -> Vec<String> {
        lock(&self.record)
            .inputs
            .iter()
            .map(|input| input.device().unique_id().to_string())
            .collect()
    }

    /// Inputs as last published to observers (i.e. at the last commit)
    pub fn published_input_ids(&self) -> Vec<InputId> {
        lock(&self.record)
            .published_inputs
            .iter()
            .map(|input| input.id())
            .collect()
    }

    pub fn input_ids(&self) -> Vec<InputId> {
        lock(&self.record)
            .inputs
            .iter()
            .map(|input| input.id())
            .collect()
    }

    pub fn input_count(&self) -> usize {
        lock(&self.record).inputs.len()
    }

    pub fn video_input_count(&self) -> usize {
        lock(&self.record)
            .inputs
            .iter()
            .filter(|input| input.media_kind() == MediaKind::Video)
            .count()
    }

    pub fn output_kinds(&self) -> Vec<OutputKind> {
        lock(&self.record)
            .outputs
            .iter()
            .map(|output| output.kind)
            .collect()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.record).running
    }

    pub fn start_calls(&self) -> usize {
        lock(&self.record).start_calls
    }

    pub fn stop_calls(&self) -> usize {
        lock(&self.record).stop_calls
    }

    pub fn begin_calls(&self) -> usize {
        lock(&self.record).begin_calls
    }

    pub fn commit_calls(&self) -> usize {
        lock(&self.record).commit_calls
    }

    /// True while a configuration transaction is open
    pub fn in_transaction(&self) -> bool {
        lock(&self.record).configuration_depth > 0
    }
}

// ===== Backend =====

/// In-memory capture backend
pub struct VirtualBackend {
    devices: Mutex<Vec<Arc<VirtualDevice>>>,
    policy: Arc<Mutex<SessionPolicy>>,
    unwrappable_devices: Mutex<HashSet<String>>,
    sessions: Mutex<Vec<VirtualSessionProbe>>,
    next_id: AtomicU64,
}

impl VirtualBackend {
    /// A backend with no devices
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            policy: Arc::new(Mutex::new(SessionPolicy::default())),
            unwrappable_devices: Mutex::new(HashSet::new()),
            sessions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// A typical phone: back and front cameras plus a microphone
    pub fn phone() -> Self {
        Self::new()
            .with_device(VirtualDevice::camera("Back Camera", DevicePosition::Back))
            .with_device(VirtualDevice::camera("Front Camera", DevicePosition::Front))
            .with_device(VirtualDevice::microphone("iPhone Microphone"))
    }

    pub fn with_device(self, device: Arc<VirtualDevice>) -> Self {
        self.add_device(device);
        self
    }

    pub fn add_device(&self, device: Arc<VirtualDevice>) {
        debug!(device = %device.name, kind = %device.kind, "Virtual device attached");
        lock(&self.devices).push(device);
    }

    /// Detach a device; it disappears from discovery
    pub fn remove_device(&self, unique_id: &str) {
        lock(&self.devices).retain(|device| device.unique_id != unique_id);
    }

    /// Typed lookup of an attached device
    pub fn device(&self, unique_id: &str) -> Option<Arc<VirtualDevice>> {
        lock(&self.devices)
            .iter()
            .find(|device| device.unique_id == unique_id)
            .cloned()
    }

    /// Sessions refuse inputs wrapping this device
    pub fn reject_inputs_for(&self, unique_id: &str) {
        lock(&self.policy)
            .rejected_devices
            .insert(unique_id.to_string());
    }

    pub fn accept_inputs_for(&self, unique_id: &str) {
        lock(&self.policy).rejected_devices.remove(unique_id);
    }

    /// Sessions refuse outputs of this kind
    pub fn reject_outputs(&self, kind: OutputKind) {
        lock(&self.policy).rejected_outputs.insert(kind);
    }

    /// `create_input` fails for this device
    pub fn fail_input_creation_for(&self, unique_id: &str) {
        lock(&self.unwrappable_devices).insert(unique_id.to_string());
    }

    /// Probe for the most recently created session
    pub fn last_session(&self) -> Option<VirtualSessionProbe> {
        lock(&self.sessions).last().cloned()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for VirtualBackend {
    fn devices(
        &self,
        kind: MediaKind,
        position: Option<DevicePosition>,
    ) -> Vec<Arc<dyn CaptureDevice>> {
        lock(&self.devices)
            .iter()
            .filter(|device| device.kind == kind)
            .filter(|device| position.is_none_or(|p| device.position == p))
            .map(|device| Arc::clone(device) as Arc<dyn CaptureDevice>)
            .collect()
    }

    fn create_input(&self, device: Arc<dyn CaptureDevice>) -> BackendResult<DeviceInput> {
        if lock(&self.unwrappable_devices).contains(device.unique_id()) {
            return Err(BackendError::Other(format!(
                "Cannot open {} for capture",
                device.name()
            )));
        }
        Ok(DeviceInput::new(InputId(self.next_id()), device))
    }

    fn create_output(&self, kind: OutputKind) -> CaptureOutput {
        CaptureOutput {
            id: OutputId(self.next_id()),
            kind,
        }
    }

    fn create_session(&self) -> Box<dyn CaptureSession> {
        let record = Arc::new(Mutex::new(SessionRecord::default()));
        lock(&self.sessions).push(VirtualSessionProbe {
            record: Arc::clone(&record),
        });
        Box::new(VirtualSession {
            record,
            policy: Arc::clone(&self.policy),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_session_accepts_one_input_per_kind() {
        let backend = VirtualBackend::phone();
        let mut session = backend.create_session();
        let cameras = backend.devices(MediaKind::Video, None);

        let back = backend.create_input(Arc::clone(&cameras[0])).unwrap();
        let front = backend.create_input(Arc::clone(&cameras[1])).unwrap();

        assert!(session.can_add_input(&back));
        session.add_input(back.clone());
        assert!(!session.can_add_input(&front));

        session.remove_input(&back);
        assert!(session.can_add_input(&front));
    }

    #[test]
    fn test_transaction_publishes_on_commit() {
        let backend = VirtualBackend::phone();
        let mut session = backend.create_session();
        let probe = backend.last_session().unwrap();
        let camera = backend.default_device(MediaKind::Video).unwrap();
        let input = backend.create_input(camera).unwrap();

        session.begin_configuration();
        session.add_input(input.clone());
        assert!(probe.in_transaction());
        assert!(probe.published_input_ids().is_empty());

        session.commit_configuration();
        assert_eq!(probe.published_input_ids(), vec![input.id()]);
    }

    #[test]
    fn test_observers_fire_until_removed() {
        let device = VirtualDevice::camera("Back Camera", DevicePosition::Back);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);

        let token = device.observe_adjusting_exposure(Box::new(move |_| {
            fired_clone.store(true, Ordering::SeqCst);
        }));
        device.report_adjusting_exposure(false);
        assert!(fired.swap(false, Ordering::SeqCst));

        device.remove_observer(token);
        device.report_adjusting_exposure(false);
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(device.removed_observer_count(), 1);
    }

    #[test]
    fn test_settle_during_check_reports_stale_value() {
        let device = VirtualDevice::camera("Back Camera", DevicePosition::Back);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        device.observe_adjusting_exposure(Box::new(move |adjusting| {
            fired_clone.store(!adjusting, Ordering::SeqCst);
        }));

        device.settle_during_next_adjusting_check();
        assert!(device.is_adjusting_exposure());
        assert!(fired.load(Ordering::SeqCst));
        assert!(!device.is_adjusting_exposure());
    }

    #[test]
    fn test_rejected_device_cannot_be_added() {
        let backend = VirtualBackend::phone();
        let session = backend.create_session();
        let camera = backend.default_device(MediaKind::Video).unwrap();
        backend.reject_inputs_for(camera.unique_id());

        let input = backend.create_input(camera).unwrap();
        assert!(!session.can_add_input(&input));
    }
}
