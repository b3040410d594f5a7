// SPDX-License-Identifier: GPL-3.0-only

//! Session events for the presentation layer

use crate::backends::camera::DevicePosition;
use crate::errors::SessionError;
use futures::channel::mpsc;

/// Outcome of an asynchronous session operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Inputs and outputs are wired
    Configured,
    /// The session is running
    Started,
    /// The session stopped
    Stopped,
    /// The active camera changed
    CameraSwitched { position: DevicePosition },
    /// A switch was attempted and rolled back
    CameraSwitchFailed,
    /// Exposure locked after a tap-to-expose settled
    ExposureLocked,
    /// A device or session could not be configured
    DeviceConfigurationFailed(SessionError),
}

/// Receiver half handed to subscribers
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Fan-out of events to every live subscriber
#[derive(Default)]
pub(crate) struct EventSink {
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    pub(crate) fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Send to all subscribers, pruning those that hung up
    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.subscribers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let mut sink = EventSink::default();
        let mut kept = sink.subscribe();
        let dropped = sink.subscribe();
        drop(dropped);

        sink.emit(SessionEvent::Started);

        assert_eq!(sink.subscribers.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), SessionEvent::Started);
    }
}
