use anyhow::Error;
use thiserror::Error;

/// Role a device plays in multi-camera wired triggering. Passed through to
/// the sensor backend, never interpreted here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    #[default]
    Standalone,
    Master,
    Subordinate,
}

impl SyncMode {
    /// Parse a sync mode from its full name or single-letter shorthand
    /// (not case sensitive). `a` is accepted for standalone.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "standalone" | "a" => Some(SyncMode::Standalone),
            "master" | "m" => Some(SyncMode::Master),
            "subordinate" | "s" => Some(SyncMode::Subordinate),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SyncMode::Standalone => "standalone",
            SyncMode::Master => "master",
            SyncMode::Subordinate => "subordinate",
        }
    }
}

/// Color camera resolution. The aligned output grid always uses these
/// dimensions because depth is mapped into the color camera's pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorResolution {
    R720p,
    R1080p,
    R1440p,
    R1536p,
    R2160p,
    R3072p,
}

impl ColorResolution {
    /// Parse a resolution from a `720P`-style string (not case sensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "720p" => Some(ColorResolution::R720p),
            "1080p" => Some(ColorResolution::R1080p),
            "1440p" => Some(ColorResolution::R1440p),
            "1536p" => Some(ColorResolution::R1536p),
            "2160p" => Some(ColorResolution::R2160p),
            "3072p" => Some(ColorResolution::R3072p),
            _ => None,
        }
    }

    /// Pixel dimensions (width, height) of the color image.
    pub fn dims(self) -> (u32, u32) {
        match self {
            ColorResolution::R720p => (1280, 720),
            ColorResolution::R1080p => (1920, 1080),
            ColorResolution::R1440p => (2560, 1440),
            ColorResolution::R1536p => (2048, 1536),
            ColorResolution::R2160p => (3840, 2160),
            ColorResolution::R3072p => (4096, 3072),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ColorResolution::R720p => "720p",
            ColorResolution::R1080p => "1080p",
            ColorResolution::R1440p => "1440p",
            ColorResolution::R1536p => "1536p",
            ColorResolution::R2160p => "2160p",
            ColorResolution::R3072p => "3072p",
        }
    }
}

/// Depth sensor mode: field of view and binning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthMode {
    NfovBinned,
    NfovUnbinned,
    WfovBinned,
    WfovUnbinned,
}

impl DepthMode {
    /// Parse a depth mode from its `NFOV_2X2BINNED`-style name (not case
    /// sensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "nfov_2x2binned" => Some(DepthMode::NfovBinned),
            "nfov_unbinned" => Some(DepthMode::NfovUnbinned),
            "wfov_2x2binned" => Some(DepthMode::WfovBinned),
            "wfov_unbinned" => Some(DepthMode::WfovUnbinned),
            _ => None,
        }
    }

    /// Native pixel dimensions of the depth image before alignment.
    pub fn dims(self) -> (u32, u32) {
        match self {
            DepthMode::NfovBinned => (320, 288),
            DepthMode::NfovUnbinned => (640, 576),
            DepthMode::WfovBinned => (512, 512),
            DepthMode::WfovUnbinned => (1024, 1024),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DepthMode::NfovBinned => "nfov_2x2binned",
            DepthMode::NfovUnbinned => "nfov_unbinned",
            DepthMode::WfovBinned => "wfov_2x2binned",
            DepthMode::WfovUnbinned => "wfov_unbinned",
        }
    }
}

/// Active streaming configuration for one camera session.
#[derive(Clone, Copy, Debug)]
pub struct StreamConfig {
    pub sync_mode: SyncMode,
    pub color_resolution: ColorResolution,
    pub depth_mode: DepthMode,
    pub fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Standalone,
            color_resolution: ColorResolution::R3072p,
            depth_mode: DepthMode::WfovUnbinned,
            fps: 5,
        }
    }
}

/// One synchronized depth+color sample pair pulled from a device.
///
/// Opaque outside this crate: consumers only ever hand it back to the
/// session for alignment. Dropping it releases the underlying sample.
pub struct RawCapture {
    pub(crate) width: u32,
    pub(crate) height: u32,
    /// Depth in millimeters, already mapped into color pixel space by the
    /// backend. 0 means no depth reading at that pixel.
    pub(crate) depth_mm: Vec<u16>,
    /// RGBA color samples, 4 bytes per pixel.
    pub(crate) color: Vec<u8>,
    pub(crate) timestamp_ms: i64,
}

/// Depth/color grid pair for one capture, aligned into the color camera's
/// pixel space and back-projected to per-pixel 3-axis positions.
pub struct AlignedFrame {
    pub width: u32,
    pub height: u32,
    /// Camera-space positions in millimeters, 3 components per pixel in
    /// row-major order. The all-zero triple marks a pixel with no depth.
    pub positions: Vec<i16>,
    /// RGBA color samples, 4 channels per pixel in row-major order.
    pub color: Vec<u8>,
    pub timestamp_ms: i64,
}

impl AlignedFrame {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to open device {selector:?}")]
    Open { selector: String },
    #[error("device {serial} rejected stream configuration: {reason}")]
    Start { serial: String, reason: String },
    #[error("capture failed on device {serial}")]
    Capture { serial: String },
    #[error("device {serial} rejected color control: {reason}")]
    ColorControl { serial: String, reason: String },
    #[error(transparent)]
    Other(#[from] Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_mode_parses_names_and_shorthands() {
        assert_eq!(SyncMode::parse("standalone"), Some(SyncMode::Standalone));
        assert_eq!(SyncMode::parse("A"), Some(SyncMode::Standalone));
        assert_eq!(SyncMode::parse("Master"), Some(SyncMode::Master));
        assert_eq!(SyncMode::parse("s"), Some(SyncMode::Subordinate));
        assert_eq!(SyncMode::parse("primary"), None);
    }

    #[test]
    fn color_resolution_parse_is_case_insensitive() {
        assert_eq!(
            ColorResolution::parse("3072P"),
            Some(ColorResolution::R3072p)
        );
        assert_eq!(ColorResolution::parse("720p"), Some(ColorResolution::R720p));
        assert_eq!(ColorResolution::parse("4k"), None);
    }

    #[test]
    fn color_resolution_dims_match_sensor_table() {
        assert_eq!(ColorResolution::R1536p.dims(), (2048, 1536));
        assert_eq!(ColorResolution::R3072p.dims(), (4096, 3072));
    }

    #[test]
    fn depth_mode_parse_and_dims() {
        assert_eq!(
            DepthMode::parse("WFOV_UNBINNED"),
            Some(DepthMode::WfovUnbinned)
        );
        assert_eq!(
            DepthMode::parse("nfov_2x2binned"),
            Some(DepthMode::NfovBinned)
        );
        assert_eq!(DepthMode::WfovUnbinned.dims(), (1024, 1024));
        assert_eq!(DepthMode::parse("wfov"), None);
    }
}
