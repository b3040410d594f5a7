// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the diagnostic binary
//!
//! This module provides command-line functionality for:
//! - Listing the devices of the virtual host
//! - Running a scripted session against it

use camera_session::backends::camera::{
    CaptureBackend, CaptureDevice, DevicePosition, ExposureMode, FocusMode, MediaKind,
    PointOfInterest, VirtualBackend, VirtualDevice,
};
use camera_session::{Config, SessionEvent, SessionManager};
use futures::StreamExt;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Serialize)]
struct DeviceSummary {
    id: String,
    name: String,
    kind: MediaKind,
    position: DevicePosition,
    focus_point: bool,
    exposure_point: bool,
    exposure_lock: bool,
}

/// Load config from an explicit path or the default location
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load_from(path)?),
        None => Ok(Config::load()),
    }
}

fn build_host(single_camera: bool, no_microphone: bool) -> VirtualBackend {
    let backend = VirtualBackend::new().with_device(VirtualDevice::camera(
        "Back Camera",
        DevicePosition::Back,
    ));
    if !single_camera {
        backend.add_device(VirtualDevice::camera("Front Camera", DevicePosition::Front));
    }
    if !no_microphone {
        backend.add_device(VirtualDevice::microphone("Built-in Microphone"));
    }
    backend
}

/// List every device of the default virtual host
pub fn list_devices(json: bool) -> CliResult {
    let backend = build_host(false, false);

    let summaries: Vec<DeviceSummary> = [MediaKind::Video, MediaKind::Audio]
        .into_iter()
        .flat_map(|kind| backend.devices(kind, None))
        .map(|device| DeviceSummary {
            id: device.unique_id().to_string(),
            name: device.name().to_string(),
            kind: device.media_kind(),
            position: device.position(),
            focus_point: device.is_focus_point_of_interest_supported()
                && device.is_focus_mode_supported(FocusMode::AutoFocus),
            exposure_point: device.is_exposure_point_of_interest_supported()
                && device.is_exposure_mode_supported(ExposureMode::AutoExpose),
            exposure_lock: device.is_exposure_mode_supported(ExposureMode::Locked),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("Available devices:");
    println!();
    for (index, device) in summaries.iter().enumerate() {
        println!("  [{}] {} ({}, {})", index, device.name, device.kind, device.position);
        if device.kind == MediaKind::Video {
            println!(
                "      Focus point: {}  Exposure point: {}  Exposure lock: {}",
                yes_no(device.focus_point),
                yes_no(device.exposure_point),
                yes_no(device.exposure_lock)
            );
        }
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn parse_point(value: &str) -> Result<PointOfInterest, String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("Expected \"x,y\", got \"{}\"", value))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("Invalid x: {}", e))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("Invalid y: {}", e))?;
    Ok(PointOfInterest::new(x, y))
}

/// Run a scripted session and print what happened
pub fn run_demo(
    config: Config,
    single_camera: bool,
    no_microphone: bool,
    point: &str,
) -> CliResult {
    let point = parse_point(point)?;
    let backend = Arc::new(build_host(single_camera, no_microphone));
    let manager = SessionManager::new(backend.clone(), config)?;
    let mut events = manager.subscribe()?;

    manager.configure()?;
    if let Some(session) = backend.last_session() {
        println!(
            "Configured: {} input(s), {} output(s), preset {}",
            session.input_count(),
            session.output_kinds().len(),
            session.preset()
        );
    }

    manager.start();
    manager.start();
    println!("Running: {}", manager.is_running());

    if let Some(camera) = manager.active_camera() {
        println!("Active camera: {} ({})", camera.name(), camera.position());
    }
    println!("Switched cameras: {}", manager.switch_cameras());

    manager.focus_at_point(point)?;
    manager.expose_at_point(point)?;

    // Let the active virtual camera settle so exposure locks
    if let Some(camera) = manager
        .active_camera()
        .and_then(|camera| backend.device(camera.unique_id()))
    {
        camera.report_adjusting_exposure(false);
    }
    println!("Exposure after settle: {:?}", manager.exposure_lock_state());

    manager.reset_focus_and_exposure()?;
    println!("Exposure after reset: {:?}", manager.exposure_lock_state());

    manager.stop();
    println!("Running: {}", manager.is_running());
    drop(manager);

    println!();
    println!("Events:");
    futures::executor::block_on(async {
        while let Some(event) = events.next().await {
            print_event(&event);
        }
    });

    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::DeviceConfigurationFailed(e) => println!("  configuration failed: {}", e),
        SessionEvent::CameraSwitched { position } => println!("  switched to {} camera", position),
        other => println!("  {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("0.25, 0.75").unwrap(), PointOfInterest::new(0.25, 0.75));
        assert_eq!(parse_point("2,-1").unwrap(), PointOfInterest::new(1.0, 0.0));
        assert!(parse_point("0.5").is_err());
        assert!(parse_point("a,b").is_err());
    }

    #[test]
    fn test_single_camera_host() {
        let backend = build_host(true, true);
        assert_eq!(backend.devices(MediaKind::Video, None).len(), 1);
        assert!(backend.devices(MediaKind::Audio, None).is_empty());
    }
}
