//! Depth camera ingestion: device sessions, stream configuration, and the
//! vendor backend seam that supplies aligned depth/color grids.

mod session;
mod synthetic;
mod types;

pub use session::{enumerate, open_device, CameraSession, DeviceBackend, DeviceSelector};
pub use synthetic::SyntheticBackend;
pub use types::{
    AlignedFrame, ColorResolution, DepthMode, DeviceError, RawCapture, StreamConfig, SyncMode,
};
