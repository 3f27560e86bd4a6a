//! Batch capture driver: synchronously capture N consecutive frames from
//! the selected devices and write each straight to disk, no caching.

use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use depth_ingest::{AlignedFrame, CameraSession, DeviceError};
use tracing::{error, info};

use crate::cloud::config::BatchConfig;
use crate::cloud::encoder;

pub(crate) fn run(config: &BatchConfig) -> Result<()> {
    let sessions = open_sessions(config)?;
    run_with_sessions(config, sessions)
}

/// Open and start every selected device, resolving its stream settings by
/// serial once the device reports one.
fn open_sessions(config: &BatchConfig) -> Result<Vec<CameraSession>> {
    let selectors = config.settings.selectors();
    if selectors.is_empty() {
        bail!("no devices attached");
    }

    let mut sessions = Vec::with_capacity(selectors.len());
    for selector in &selectors {
        let mut session = CameraSession::open(selector)
            .with_context(|| format!("failed to open device {selector}"))?;
        let stream = config.settings.resolved_stream(session.serial());
        session
            .start(&stream)
            .with_context(|| format!("failed to start device {}", session.serial()))?;
        if config.settings.exposure_ns != 0 {
            session
                .set_exposure(config.settings.exposure_ns)
                .with_context(|| format!("failed to set exposure on {}", session.serial()))?;
        }
        if config.settings.white_balance_k != 0 {
            session
                .set_white_balance(config.settings.white_balance_k)
                .with_context(|| {
                    format!("failed to set white balance on {}", session.serial())
                })?;
        }
        if config.settings.verbose {
            info!(
                "opened device {} ({}, {}, {})",
                session.serial(),
                stream.color_resolution.label(),
                stream.depth_mode.label(),
                stream.sync_mode.label()
            );
        }
        sessions.push(session);
    }
    Ok(sessions)
}

/// Capture `consecutive_count` frames from every session.
///
/// A device fault is fatal to the whole run unless `keep_going` is set,
/// in which case the failed device is dropped and the rest continue.
fn run_with_sessions(config: &BatchConfig, mut sessions: Vec<CameraSession>) -> Result<()> {
    if config.wait_ms > 0 {
        thread::sleep(Duration::from_millis(config.wait_ms));
    }

    for frame_index in 0..config.consecutive_count {
        let mut failed = Vec::new();
        for (slot, session) in sessions.iter_mut().enumerate() {
            let frame = match capture_one(session) {
                Ok(frame) => frame,
                Err(err) if config.keep_going => {
                    error!(
                        "device {} failed: {err}; continuing with remaining devices",
                        session.serial()
                    );
                    failed.push(slot);
                    continue;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("capture failed on device {}", session.serial()));
                }
            };

            let path =
                format_output_path(&config.output_template, session.serial(), frame_index as u64);
            write_cloud_file(&path, &frame)?;
        }

        for slot in failed.into_iter().rev() {
            sessions.remove(slot);
        }
        if sessions.is_empty() {
            bail!("all devices failed");
        }

        info!("frame {frame_index} done");
    }

    Ok(())
}

/// Block until the device produces a usable frame, skipping dropped or
/// malformed samples.
fn capture_one(session: &mut CameraSession) -> Result<AlignedFrame, DeviceError> {
    loop {
        if let Some(frame) = session.next_aligned()? {
            return Ok(frame);
        }
    }
}

/// Substitute the first `%s` with the serial and the first `%f` with the
/// frame index; literal text passes through unchanged.
fn format_output_path(template: &str, serial: &str, frame_index: u64) -> String {
    let mut path = template.to_string();
    if let Some(pos) = path.find("%s") {
        path.replace_range(pos..pos + 2, serial);
    }
    if let Some(pos) = path.find("%f") {
        path.replace_range(pos..pos + 2, &frame_index.to_string());
    }
    path
}

/// `.pts` paths get the text layout, everything else the binary layout.
fn write_cloud_file(path: &str, frame: &AlignedFrame) -> Result<()> {
    if path.ends_with(".pts") {
        fs::write(path, encoder::encode_text(frame))
    } else {
        fs::write(path, encoder::encode_binary(frame))
    }
    .with_context(|| format!("failed to write point cloud to {path}"))
}
