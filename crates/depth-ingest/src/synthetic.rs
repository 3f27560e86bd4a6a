//! Synthetic sensor backend.
//!
//! Produces deterministic depth/color pairs without hardware so the
//! pipeline can run end-to-end on any machine. Hardware backends implement
//! [`DeviceBackend`] out of tree; this one stands in for them everywhere a
//! physical device is absent, and paces captures at the configured frame
//! rate the way a real sensor would.

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::session::DeviceBackend;
use crate::types::{AlignedFrame, DeviceError, RawCapture, StreamConfig};

/// Serials reported by [`attached_serials`], mirroring a two-camera rig.
const SERIALS: [&str; 2] = ["770000001123", "770000002456"];

/// Nominal focal length used for the synthetic back-projection, in pixels.
const FOCAL_PX: i32 = 600;

pub fn attached_serials() -> Vec<String> {
    SERIALS.iter().map(|s| s.to_string()).collect()
}

pub fn open_index(index: usize) -> Option<Box<dyn DeviceBackend>> {
    SERIALS
        .get(index)
        .map(|serial| Box::new(SyntheticBackend::new(serial)) as Box<dyn DeviceBackend>)
}

pub fn open_serial(serial: &str) -> Option<Box<dyn DeviceBackend>> {
    SERIALS
        .iter()
        .find(|known| **known == serial)
        .map(|serial| Box::new(SyntheticBackend::new(serial)) as Box<dyn DeviceBackend>)
}

pub struct SyntheticBackend {
    serial: String,
    /// Set once `start` ran; capture before start is a device fault.
    dims: Option<(u32, u32)>,
    /// Fixed test dimensions that override the configured resolution.
    grid_override: Option<(u32, u32)>,
    frame_index: u64,
    interval: Duration,
    last_capture: Option<Instant>,
    exposure_ns: u32,
    white_balance_k: u32,
}

impl SyntheticBackend {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            dims: None,
            grid_override: None,
            frame_index: 0,
            interval: Duration::ZERO,
            last_capture: None,
            exposure_ns: 0,
            white_balance_k: 0,
        }
    }

    /// Unpaced backend with a fixed tiny grid, for tests.
    pub fn with_grid(serial: &str, width: u32, height: u32) -> Self {
        let mut backend = Self::new(serial);
        backend.grid_override = Some((width, height));
        backend
    }

    fn generate(&self, width: u32, height: u32) -> RawCapture {
        let pixels = width as usize * height as usize;
        let mut depth_mm = vec![0u16; pixels];
        let mut color = vec![0u8; pixels * 4];

        // Valid depth inside a centered disc, no reading outside it.
        let cx = width as i64 / 2;
        let cy = height as i64 / 2;
        let radius = (width.min(height) as i64 / 3).max(1);
        for y in 0..height as i64 {
            for x in 0..width as i64 {
                let idx = (y * width as i64 + x) as usize;
                let dx = x - cx;
                let dy = y - cy;
                if dx * dx + dy * dy <= radius * radius {
                    depth_mm[idx] = (500 + dx.abs() + dy.abs() + (self.frame_index as i64 % 16))
                        as u16;
                }
                color[idx * 4] = (x * 255 / width.max(1) as i64) as u8;
                color[idx * 4 + 1] = (y * 255 / height.max(1) as i64) as u8;
                color[idx * 4 + 2] = (self.frame_index % 256) as u8;
                color[idx * 4 + 3] = 255;
            }
        }

        RawCapture {
            width,
            height,
            depth_mm,
            color,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl DeviceBackend for SyntheticBackend {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn start(&mut self, config: &StreamConfig) -> Result<(), DeviceError> {
        let dims = self
            .grid_override
            .unwrap_or_else(|| config.color_resolution.dims());
        if config.fps == 0 {
            return Err(DeviceError::Start {
                serial: self.serial.clone(),
                reason: "frame rate must be at least 1".into(),
            });
        }
        self.dims = Some(dims);
        self.interval = if self.grid_override.is_some() {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / config.fps
        };
        debug!(
            serial = %self.serial,
            width = dims.0,
            height = dims.1,
            sync = config.sync_mode.label(),
            "synthetic stream started"
        );
        Ok(())
    }

    fn next_capture(&mut self) -> Result<Option<RawCapture>, DeviceError> {
        let (width, height) = self.dims.ok_or_else(|| DeviceError::Capture {
            serial: self.serial.clone(),
        })?;

        // The device's own cadence governs capture frequency.
        if let Some(last) = self.last_capture {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last_capture = Some(Instant::now());

        let capture = self.generate(width, height);
        self.frame_index += 1;
        Ok(Some(capture))
    }

    fn align(&self, capture: &RawCapture) -> Result<AlignedFrame, DeviceError> {
        let width = capture.width;
        let height = capture.height;
        let pixels = width as usize * height as usize;
        let mut positions = vec![0i16; pixels * 3];

        let cx = width as i32 / 2;
        let cy = height as i32 / 2;
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let idx = (y * width as i32 + x) as usize;
                let z = capture.depth_mm[idx] as i32;
                if z == 0 {
                    continue;
                }
                positions[idx * 3] = ((x - cx) * z / FOCAL_PX).clamp(-32768, 32767) as i16;
                positions[idx * 3 + 1] = ((y - cy) * z / FOCAL_PX).clamp(-32768, 32767) as i16;
                positions[idx * 3 + 2] = z.clamp(1, 32767) as i16;
            }
        }

        Ok(AlignedFrame {
            width,
            height,
            positions,
            color: capture.color.clone(),
            timestamp_ms: capture.timestamp_ms,
        })
    }

    fn set_exposure(&mut self, nanos: u32) -> Result<(), DeviceError> {
        self.exposure_ns = nanos;
        Ok(())
    }

    fn set_white_balance(&mut self, kelvin: u32) -> Result<(), DeviceError> {
        if kelvin != 0 && kelvin % 10 != 0 {
            return Err(DeviceError::ColorControl {
                serial: self.serial.clone(),
                reason: "white balance must be divisible by 10".into(),
            });
        }
        self.white_balance_k = kelvin;
        Ok(())
    }

    fn stop(&mut self) {
        self.dims = None;
        self.last_capture = None;
    }
}
