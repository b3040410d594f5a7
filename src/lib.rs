// SPDX-License-Identifier: GPL-3.0-only

//! Camera session lifecycle manager
//!
//! This library drives a platform capture session: it wires the default
//! camera, microphone and output sinks into a session, starts and stops it
//! off the caller's thread, switches between cameras with rollback, and
//! handles tap-to-focus / tap-to-expose including the deferred exposure lock.
//!
//! # Architecture
//!
//! - [`session`]: The session manager, its serial queue and events
//! - [`backends`]: Capture traits and the virtual backend
//! - [`config`]: User configuration handling
//! - [`errors`]: Error types
//!
//! # Example
//!
//! ```
//! use camera_session::backends::camera::{PointOfInterest, VirtualBackend};
//! use camera_session::{Config, SessionManager};
//! use std::sync::Arc;
//!
//! let manager = SessionManager::new(Arc::new(VirtualBackend::phone()), Config::default())?;
//! manager.configure()?;
//! manager.start();
//! manager.focus_at_point(PointOfInterest::new(0.25, 0.75))?;
//! assert!(manager.switch_cameras());
//! manager.stop();
//! # Ok::<(), camera_session::SessionError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use errors::{SessionError, SessionResult};
pub use session::{ExposureLockState, SessionEvent, SessionManager};
