//! Camera session lifecycle over the vendor backend seam.
//!
//! A [`CameraSession`] owns exactly one open device and at most one
//! in-flight raw capture. Acquiring the next capture is the sole trigger
//! for releasing the previous one, and the backend is stopped and closed
//! when the session drops, on every exit path.

use std::fmt;

use tracing::debug;

use crate::synthetic;
use crate::types::{AlignedFrame, DeviceError, RawCapture, StreamConfig};

/// Vendor-side sensor interface. The crate never performs 3D math itself;
/// alignment and back-projection live behind this trait.
pub trait DeviceBackend: Send {
    fn serial(&self) -> &str;

    /// Start the cameras with the given configuration. Must be called
    /// before the first capture.
    fn start(&mut self, config: &StreamConfig) -> Result<(), DeviceError>;

    /// Block until the device produces its next synchronized depth+color
    /// pair. `Ok(None)` marks a dropped or malformed sample the caller
    /// should skip; `Err` is a hard device fault.
    fn next_capture(&mut self) -> Result<Option<RawCapture>, DeviceError>;

    /// Map a raw capture into the color camera's pixel space and
    /// back-project depth to per-pixel positions.
    fn align(&self, capture: &RawCapture) -> Result<AlignedFrame, DeviceError>;

    /// Color exposure time in nanoseconds; 0 selects automatic exposure.
    fn set_exposure(&mut self, nanos: u32) -> Result<(), DeviceError>;

    /// Color white balance in kelvin; 0 selects automatic white balance.
    fn set_white_balance(&mut self, kelvin: u32) -> Result<(), DeviceError>;

    fn stop(&mut self);
}

/// How the operator named a device on the command line.
#[derive(Clone, Debug)]
pub enum DeviceSelector {
    Index(usize),
    Serial(String),
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Index(index) => write!(f, "#{index}"),
            DeviceSelector::Serial(serial) => f.write_str(serial),
        }
    }
}

/// Serial numbers of every attached device, in enumeration order.
pub fn enumerate() -> Vec<String> {
    synthetic::attached_serials()
}

/// Resolve a selector to an opened backend handle.
pub fn open_device(selector: &DeviceSelector) -> Result<Box<dyn DeviceBackend>, DeviceError> {
    let backend = match selector {
        DeviceSelector::Index(index) => synthetic::open_index(*index),
        DeviceSelector::Serial(serial) => synthetic::open_serial(serial),
    };
    backend.ok_or_else(|| DeviceError::Open {
        selector: selector.to_string(),
    })
}

/// One open camera: a backend handle plus the single in-flight capture.
pub struct CameraSession {
    backend: Box<dyn DeviceBackend>,
    current: Option<RawCapture>,
}

impl CameraSession {
    /// Open the device named by `selector`.
    pub fn open(selector: &DeviceSelector) -> Result<Self, DeviceError> {
        let backend = open_device(selector)?;
        debug!("opened device {}", backend.serial());
        Ok(Self::from_backend(backend))
    }

    /// Wrap an already-opened backend. Used by tests and by callers that
    /// enumerate devices themselves.
    pub fn from_backend(backend: Box<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            current: None,
        }
    }

    pub fn serial(&self) -> &str {
        self.backend.serial()
    }

    pub fn start(&mut self, config: &StreamConfig) -> Result<(), DeviceError> {
        self.backend.start(config)
    }

    pub fn set_exposure(&mut self, nanos: u32) -> Result<(), DeviceError> {
        self.backend.set_exposure(nanos)
    }

    pub fn set_white_balance(&mut self, kelvin: u32) -> Result<(), DeviceError> {
        self.backend.set_white_balance(kelvin)
    }

    /// Block for the next capture, releasing the previous one first.
    ///
    /// Returns `Ok(false)` when the device produced a dropped/malformed
    /// sample; the session then holds no capture.
    pub fn capture_frame(&mut self) -> Result<bool, DeviceError> {
        // Release before acquire: at most one capture is ever held.
        self.current = None;
        self.current = self.backend.next_capture()?;
        Ok(self.current.is_some())
    }

    /// Align the currently held capture, if any.
    pub fn aligned(&self) -> Result<Option<AlignedFrame>, DeviceError> {
        match &self.current {
            Some(capture) => self.backend.align(capture).map(Some),
            None => Ok(None),
        }
    }

    /// Capture and align in one step.
    pub fn next_aligned(&mut self) -> Result<Option<AlignedFrame>, DeviceError> {
        if !self.capture_frame()? {
            return Ok(None);
        }
        self.aligned()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.current = None;
        self.backend.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticBackend;
    use crate::types::{ColorResolution, DepthMode, SyncMode};

    fn test_config() -> StreamConfig {
        StreamConfig {
            sync_mode: SyncMode::Standalone,
            color_resolution: ColorResolution::R720p,
            depth_mode: DepthMode::NfovBinned,
            fps: 30,
        }
    }

    #[test]
    fn open_by_bad_serial_fails() {
        let err = CameraSession::open(&DeviceSelector::Serial("999999999999".into()))
            .err()
            .expect("unknown serial must not open");
        assert!(matches!(err, DeviceError::Open { .. }));
    }

    #[test]
    fn open_by_index_zero_succeeds() {
        let session = CameraSession::open(&DeviceSelector::Index(0)).unwrap();
        assert!(!session.serial().is_empty());
    }

    #[test]
    fn next_aligned_yields_color_sized_grids() {
        let mut session =
            CameraSession::from_backend(Box::new(SyntheticBackend::with_grid("test-cam", 16, 12)));
        session.start(&test_config()).unwrap();
        let frame = session.next_aligned().unwrap().expect("synthetic frame");
        assert_eq!(frame.width, 16);
        assert_eq!(frame.height, 12);
        assert_eq!(frame.positions.len(), 16 * 12 * 3);
        assert_eq!(frame.color.len(), 16 * 12 * 4);
    }

    #[test]
    fn capture_before_start_is_a_device_error() {
        let mut session =
            CameraSession::from_backend(Box::new(SyntheticBackend::with_grid("test-cam", 8, 8)));
        assert!(session.capture_frame().is_err());
    }

    #[test]
    fn aligned_without_capture_is_none() {
        let session =
            CameraSession::from_backend(Box::new(SyntheticBackend::with_grid("test-cam", 8, 8)));
        assert!(session.aligned().unwrap().is_none());
    }
}
