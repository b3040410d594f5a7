// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for capture hardware
//!
//! # Modules
//!
//! - [`camera`]: Capture device, session and backend traits plus the
//!   in-memory virtual backend

pub mod camera;
