// SPDX-License-Identifier: GPL-3.0-only

//! Serial session queue
//!
//! A single named worker thread owns the session state and runs submitted
//! jobs one at a time, in submission order. Every session or device mutation
//! goes through here, so two reconfigurations can never interleave and the
//! blocking start/stop calls never run on the caller's thread.

use crate::errors::{SessionError, SessionResult};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Job(Job<S>),
    Shutdown,
}

/// Owner of the worker thread
///
/// Dropping the queue finishes all jobs already submitted, then stops and
/// joins the worker. The state is dropped on the worker thread.
pub struct SessionQueue<S: Send + 'static> {
    sender: Sender<Message<S>>,
    thread_handle: Option<JoinHandle<()>>,
    name: String,
}

/// Cloneable submit-only handle
///
/// Used by callbacks that fire on foreign threads and need to re-enter the
/// queue. Submitting after the queue shut down is a logged no-op.
pub struct QueueHandle<S: Send + 'static> {
    sender: Sender<Message<S>>,
}

impl<S: Send + 'static> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<S: Send + 'static> QueueHandle<S> {
    /// Enqueue a job without waiting. Returns false if the queue is gone.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let sent = self.sender.send(Message::Job(Box::new(job))).is_ok();
        if !sent {
            debug!("Session queue closed, dropping job");
        }
        sent
    }
}

impl<S: Send + 'static> SessionQueue<S> {
    /// Spawn the worker thread, moving `state` onto it
    pub fn spawn(name: &str, state: S) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let name_clone = name.to_string();

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_main(&name_clone, state, receiver))?;

        info!(name = %name, "Session queue started");

        Ok(Self {
            sender,
            thread_handle: Some(thread_handle),
            name: name.to_string(),
        })
    }

    /// Enqueue a job without waiting
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.handle().dispatch(job)
    }

    /// Run a job on the worker and wait for its result
    ///
    /// Acts as a barrier: every job submitted earlier has completed when this
    /// returns. Must not be called from inside a job.
    pub fn run<F, R>(&self, job: F) -> SessionResult<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel::<R>(1);

        let submitted = self.dispatch(move |state| {
            // Receiver only disappears if the caller stopped waiting
            let _ = reply_tx.send(job(state));
        });
        if !submitted {
            return Err(SessionError::QueueClosed);
        }

        reply_rx.recv().map_err(|_| {
            warn!(name = %self.name, "Session queue dropped a job without replying");
            SessionError::QueueClosed
        })
    }

    pub fn handle(&self) -> QueueHandle<S> {
        QueueHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S: Send + 'static> Drop for SessionQueue<S> {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for session queue to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Session queue thread panicked: {:?}", e);
            }
        }
    }
}

fn worker_main<S>(name: &str, mut state: S, receiver: Receiver<Message<S>>) {
    debug!(name = %name, "Session queue thread running");

    while let Ok(message) = receiver.recv() {
        match message {
            Message::Job(job) => job(&mut state),
            Message::Shutdown => {
                debug!(name = %name, "Shutdown requested");
                break;
            }
        }
    }

    drop(state);
    info!(name = %name, "Session queue thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_jobs_run_in_order() {
        let queue = SessionQueue::spawn("test-order", Vec::new()).unwrap();
        for i in 0..5 {
            queue.dispatch(move |log: &mut Vec<i32>| log.push(i));
        }
        let log = queue.run(|log| log.clone()).unwrap();
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_jobs_run_on_named_worker() {
        let queue = SessionQueue::spawn("test-worker-name", ()).unwrap();
        let name = queue
            .run(|_| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("test-worker-name"));
    }

    #[test]
    fn test_handle_outlives_queue() {
        let queue = SessionQueue::spawn("test-handle", 0u32).unwrap();
        let handle = queue.handle();
        assert!(handle.dispatch(|count| *count += 1));
        drop(queue);
        assert!(!handle.dispatch(|count| *count += 1));
    }

    #[test]
    fn test_drop_drains_pending_jobs() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        {
            let queue = SessionQueue::spawn("test-drain", ()).unwrap();
            queue.dispatch(move |_| ran_clone.store(true, Ordering::SeqCst));
        }
        assert!(ran.load(Ordering::SeqCst));
    }
}
