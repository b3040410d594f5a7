// SPDX-License-Identifier: GPL-3.0-only

//! Tap-to-expose lock tracking
//!
//! After a tap-to-expose the device meters for a while; once it reports that
//! it stopped adjusting, exposure is locked so it doesn't drift when the
//! scene changes. The watch is an explicit one-shot observer registered on
//! the device and always deregistered by its owner.
//!
//! ```text
//! AutoExpose --(tap, lockable)--------> Watching
//! Watching   --(settled)--------------> Locked      [deregister]
//! Watching   --(reset / switch / tap)-> AutoExpose  [deregister]
//! Locked     --(reset)----------------> AutoExpose
//! ```

use crate::backends::camera::{CaptureDevice, ObserverToken};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Exposure lock flow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExposureLockState {
    /// Device meters automatically
    #[default]
    AutoExpose,
    /// Waiting for the device to finish adjusting
    Watching,
    /// Exposure held after the device settled
    Locked,
}

struct ExposureWatch {
    device: Arc<dyn CaptureDevice>,
    token: ObserverToken,
    generation: u64,
    /// Set when a "settled" notification has been forwarded and not yet handled
    notified: Arc<AtomicBool>,
}

/// Owns at most one adjusting-exposure watch
#[derive(Default)]
pub(crate) struct ExposureLockTracker {
    state: ExposureLockState,
    watch: Option<ExposureWatch>,
    generation: u64,
}

impl ExposureLockTracker {
    pub(crate) fn state(&self) -> ExposureLockState {
        self.state
    }

    /// Start watching `device`, replacing any previous watch
    ///
    /// `on_settled` is called (from whatever thread the device notifies on)
    /// with the watch generation when the device reports it stopped
    /// adjusting. Further reports are swallowed until [`rearm`] is called.
    ///
    /// [`rearm`]: ExposureLockTracker::rearm
    pub(crate) fn watch<F>(&mut self, device: &Arc<dyn CaptureDevice>, on_settled: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let notified = Arc::new(AtomicBool::new(false));
        let notified_clone = Arc::clone(&notified);

        let token = device.observe_adjusting_exposure(Box::new(move |adjusting| {
            if !adjusting && !notified_clone.swap(true, Ordering::SeqCst) {
                on_settled(generation);
            }
        }));

        debug!(device = %device.name(), generation, "Watching exposure adjustment");

        self.watch = Some(ExposureWatch {
            device: Arc::clone(device),
            token,
            generation,
            notified,
        });
        self.state = ExposureLockState::Watching;
    }

    /// Device of the watch with this generation, if it is still pending
    pub(crate) fn pending_device(&self, generation: u64) -> Option<Arc<dyn CaptureDevice>> {
        self.watch
            .as_ref()
            .filter(|watch| watch.generation == generation)
            .map(|watch| Arc::clone(&watch.device))
    }

    /// Accept the next "settled" report again (the device resumed adjusting)
    pub(crate) fn rearm(&self, generation: u64) {
        if let Some(watch) = self.watch.as_ref().filter(|w| w.generation == generation) {
            watch.notified.store(false, Ordering::SeqCst);
        }
    }

    /// Deregister the pending watch, ending in `Locked` or `AutoExpose`
    pub(crate) fn finish(&mut self, locked: bool) {
        self.deregister();
        self.state = if locked {
            ExposureLockState::Locked
        } else {
            ExposureLockState::AutoExpose
        };
    }

    /// Drop any pending watch and return to `AutoExpose`
    pub(crate) fn cancel(&mut self) {
        self.deregister();
        self.state = ExposureLockState::AutoExpose;
    }

    fn deregister(&mut self) {
        if let Some(watch) = self.watch.take() {
            watch.device.remove_observer(watch.token);
            debug!(
                device = %watch.device.name(),
                generation = watch.generation,
                "Exposure watch deregistered"
            );
        }
    }
}

impl Drop for ExposureLockTracker {
    fn drop(&mut self) {
        self.deregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{DevicePosition, VirtualDevice};
    use std::sync::atomic::AtomicUsize;

    fn camera() -> (Arc<VirtualDevice>, Arc<dyn CaptureDevice>) {
        let device = VirtualDevice::camera("Back Camera", DevicePosition::Back);
        let shared: Arc<dyn CaptureDevice> = device.clone();
        (device, shared)
    }

    #[test]
    fn test_settled_forwarded_once_until_rearmed() {
        let (device, shared) = camera();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let mut tracker = ExposureLockTracker::default();
        tracker.watch(&shared, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(tracker.state(), ExposureLockState::Watching);

        device.report_adjusting_exposure(true);
        device.report_adjusting_exposure(false);
        device.report_adjusting_exposure(false);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tracker.rearm(1);
        device.report_adjusting_exposure(false);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_watch_replaces_old() {
        let (device, shared) = camera();
        let mut tracker = ExposureLockTracker::default();

        tracker.watch(&shared, |_| {});
        tracker.watch(&shared, |_| {});

        assert_eq!(device.observer_count(), 1);
        assert_eq!(device.removed_observer_count(), 1);
        assert!(tracker.pending_device(1).is_none());
        assert!(tracker.pending_device(2).is_some());
    }

    #[test]
    fn test_finish_and_cancel_transitions() {
        let (device, shared) = camera();
        let mut tracker = ExposureLockTracker::default();

        tracker.watch(&shared, |_| {});
        tracker.finish(true);
        assert_eq!(tracker.state(), ExposureLockState::Locked);
        assert_eq!(device.observer_count(), 0);

        tracker.cancel();
        assert_eq!(tracker.state(), ExposureLockState::AutoExpose);
        assert_eq!(device.removed_observer_count(), 1);
    }

    #[test]
    fn test_drop_deregisters() {
        let (device, shared) = camera();
        {
            let mut tracker = ExposureLockTracker::default();
            tracker.watch(&shared, |_| {});
        }
        assert_eq!(device.observer_count(), 0);
    }
}
