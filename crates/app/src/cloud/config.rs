//! Command-line configuration for the capture and serve modes.
//!
//! Parsing builds one immutable config struct per mode before any device
//! is opened; there is no ambient configuration state. Invalid flags are
//! collected into an alert list and reported together, so the operator
//! sees every mistake in one pass and the process exits without side
//! effects.

use std::collections::HashMap;

use anyhow::{Result, bail};
use depth_ingest::{ColorResolution, DepthMode, DeviceSelector, StreamConfig, SyncMode};
use tracing::warn;

const VALID_RESOLUTIONS: &str = "{ 720p, 1080p, 1440p, 1536p, 2160p, 3072p }";
const VALID_DEPTH_MODES: &str =
    "{ nfov_2x2binned, nfov_unbinned, wfov_2x2binned, wfov_unbinned }";

pub(crate) const CAPTURE_USAGE: &str = "Usage: depthcloud capture \
[--output <template>] [--count <n>] [--wait <ms>] [--device <serial>]... \
[--all-devices] [--sync <serial> <standalone|master|subordinate>] \
[--resolution <serial> <res>] [--resolution-all <res>] \
[--depth-mode <serial> <mode>] [--depth-mode-all <mode>] \
[--exposure <ns>] [--white-balance <kelvin>] [--keep-going] [--verbose]\n\
The output template substitutes %s with the device serial and %f with the \
frame index; `.pts` paths use the text layout, anything else the binary \
layout.";

pub(crate) const SERVE_USAGE: &str = "Usage: depthcloud serve \
[--device <serial>] [--cache-frames <n>] [--listen <addr:port>] \
[--sync <serial> <standalone|master|subordinate>] \
[--resolution <serial> <res>] [--resolution-all <res>] \
[--depth-mode <serial> <mode>] [--depth-mode-all <mode>] \
[--exposure <ns>] [--white-balance <kelvin>] [--verbose]";

/// Per-device overrides keyed by serial number.
#[derive(Clone, Debug, Default)]
pub(crate) struct DeviceOverrides {
    pub(crate) sync_mode: Option<SyncMode>,
    pub(crate) color_resolution: Option<ColorResolution>,
    pub(crate) depth_mode: Option<DepthMode>,
}

/// Which devices a run operates on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum DeviceSelection {
    /// No explicit selection: the first attached device.
    Default,
    Serials(Vec<String>),
    All,
}

/// Device settings shared by both modes, resolved per serial as
/// per-device override > global override > documented default.
#[derive(Clone, Debug)]
pub(crate) struct CaptureSettings {
    pub(crate) selection: DeviceSelection,
    pub(crate) overrides: HashMap<String, DeviceOverrides>,
    pub(crate) resolution_all: Option<ColorResolution>,
    pub(crate) depth_mode_all: Option<DepthMode>,
    pub(crate) exposure_ns: u32,
    pub(crate) white_balance_k: u32,
    pub(crate) verbose: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            selection: DeviceSelection::Default,
            overrides: HashMap::new(),
            resolution_all: None,
            depth_mode_all: None,
            exposure_ns: 0,
            white_balance_k: 0,
            verbose: false,
        }
    }
}

impl CaptureSettings {
    /// Stream configuration for one device.
    pub(crate) fn resolved_stream(&self, serial: &str) -> StreamConfig {
        let defaults = StreamConfig::default();
        let overrides = self.overrides.get(serial);
        StreamConfig {
            sync_mode: overrides
                .and_then(|o| o.sync_mode)
                .unwrap_or(defaults.sync_mode),
            color_resolution: overrides
                .and_then(|o| o.color_resolution)
                .or(self.resolution_all)
                .unwrap_or(defaults.color_resolution),
            depth_mode: overrides
                .and_then(|o| o.depth_mode)
                .or(self.depth_mode_all)
                .unwrap_or(defaults.depth_mode),
            fps: defaults.fps,
        }
    }

    /// Selectors for the devices this run opens, in selection order.
    pub(crate) fn selectors(&self) -> Vec<DeviceSelector> {
        match &self.selection {
            DeviceSelection::Default => vec![DeviceSelector::Index(0)],
            DeviceSelection::Serials(serials) => serials
                .iter()
                .map(|serial| DeviceSelector::Serial(serial.clone()))
                .collect(),
            DeviceSelection::All => depth_ingest::enumerate()
                .into_iter()
                .map(DeviceSelector::Serial)
                .collect(),
        }
    }
}

/// Configuration for the batch capture driver.
#[derive(Clone, Debug)]
pub(crate) struct BatchConfig {
    pub(crate) settings: CaptureSettings,
    pub(crate) output_template: String,
    pub(crate) wait_ms: u64,
    pub(crate) consecutive_count: u32,
    pub(crate) keep_going: bool,
}

/// Configuration for the streaming server mode.
#[derive(Clone, Debug)]
pub(crate) struct ServeConfig {
    pub(crate) settings: CaptureSettings,
    pub(crate) cache_frames: usize,
    pub(crate) listen: String,
}

impl BatchConfig {
    pub(crate) fn from_args(args: &[String]) -> Result<Self> {
        let mut settings = CaptureSettings::default();
        let mut alerts = Vec::new();
        let mut output_template = String::from("%s_%f.pts");
        let mut wait_ms: u64 = 0;
        let mut consecutive_count: u32 = 1;
        let mut keep_going = false;

        let mut idx = 2;
        while idx < args.len() {
            match args[idx].as_str() {
                "--output" => {
                    if let Some(value) = take_value(args, &mut idx, "--output", &mut alerts) {
                        output_template = value.to_string();
                    }
                }
                "--wait" => {
                    if let Some(value) = take_value(args, &mut idx, "--wait", &mut alerts) {
                        match value.parse::<u64>() {
                            Ok(ms) => wait_ms = ms,
                            Err(_) => alerts
                                .push(format!("--wait must be an integer, got {value:?}")),
                        }
                    }
                }
                "--count" => {
                    if let Some(value) = take_value(args, &mut idx, "--count", &mut alerts) {
                        match value.parse::<u32>() {
                            // Zero consecutive frames makes no run at all.
                            Ok(count) => consecutive_count = count.max(1),
                            Err(_) => alerts
                                .push(format!("--count must be an integer, got {value:?}")),
                        }
                    }
                }
                "--keep-going" => keep_going = true,
                other => {
                    if !parse_common_flag(other, args, &mut idx, &mut settings, &mut alerts) {
                        alerts.push(format!("unrecognised flag: {other}"));
                    }
                }
            }
            idx += 1;
        }

        finish(alerts, CAPTURE_USAGE)?;
        Ok(Self {
            settings,
            output_template,
            wait_ms,
            consecutive_count,
            keep_going,
        })
    }
}

impl ServeConfig {
    pub(crate) fn from_args(args: &[String]) -> Result<Self> {
        let mut settings = CaptureSettings::default();
        let mut alerts = Vec::new();
        let mut cache_frames: usize = 64;
        let mut listen = String::from("127.0.0.1:5687");

        let mut idx = 2;
        while idx < args.len() {
            match args[idx].as_str() {
                "--cache-frames" => {
                    if let Some(value) = take_value(args, &mut idx, "--cache-frames", &mut alerts)
                    {
                        match value.parse::<usize>() {
                            Ok(frames) if frames > 0 => cache_frames = frames,
                            Ok(_) => alerts.push("--cache-frames must be at least 1".into()),
                            Err(_) => alerts.push(format!(
                                "--cache-frames must be an integer, got {value:?}"
                            )),
                        }
                    }
                }
                "--listen" => {
                    if let Some(value) = take_value(args, &mut idx, "--listen", &mut alerts) {
                        listen = value.to_string();
                    }
                }
                other => {
                    if !parse_common_flag(other, args, &mut idx, &mut settings, &mut alerts) {
                        alerts.push(format!("unrecognised flag: {other}"));
                    }
                }
            }
            idx += 1;
        }

        if matches!(settings.selection, DeviceSelection::Serials(ref s) if s.len() > 1) {
            alerts.push("serve mode streams exactly one device".into());
        }
        if settings.selection == DeviceSelection::All {
            alerts.push("serve mode streams exactly one device; --all-devices is not valid".into());
        }

        finish(alerts, SERVE_USAGE)?;
        Ok(Self {
            settings,
            cache_frames,
            listen,
        })
    }

    /// The single device this server streams from.
    pub(crate) fn selector(&self) -> DeviceSelector {
        self.settings
            .selectors()
            .into_iter()
            .next()
            .unwrap_or(DeviceSelector::Index(0))
    }
}

/// Handle a flag shared by both modes. Returns false when the flag is not
/// recognised here.
fn parse_common_flag(
    flag: &str,
    args: &[String],
    idx: &mut usize,
    settings: &mut CaptureSettings,
    alerts: &mut Vec<String>,
) -> bool {
    match flag {
        "--device" => {
            if let Some(value) = take_value(args, idx, "--device", alerts) {
                check_serial(value, "--device");
                match &mut settings.selection {
                    DeviceSelection::Serials(serials) => serials.push(value.to_string()),
                    DeviceSelection::All => {
                        alerts.push("--device and --all-devices are mutually exclusive".into())
                    }
                    DeviceSelection::Default => {
                        settings.selection = DeviceSelection::Serials(vec![value.to_string()])
                    }
                }
            }
        }
        "--all-devices" => match settings.selection {
            DeviceSelection::Serials(_) => {
                alerts.push("--device and --all-devices are mutually exclusive".into())
            }
            _ => settings.selection = DeviceSelection::All,
        },
        "--sync" => {
            if let Some((serial, value)) = take_pair(args, idx, "--sync", alerts) {
                check_serial(&serial, "--sync");
                match SyncMode::parse(&value) {
                    Some(mode) => {
                        settings.overrides.entry(serial).or_default().sync_mode = Some(mode)
                    }
                    None => alerts.push(format!(
                        "--sync mode must be standalone, master, or subordinate, got {value:?}"
                    )),
                }
            }
        }
        "--resolution" => {
            if let Some((serial, value)) = take_pair(args, idx, "--resolution", alerts) {
                check_serial(&serial, "--resolution");
                match ColorResolution::parse(&value) {
                    Some(resolution) => {
                        settings
                            .overrides
                            .entry(serial)
                            .or_default()
                            .color_resolution = Some(resolution)
                    }
                    None => alerts.push(format!(
                        "--resolution must be one of {VALID_RESOLUTIONS}, got {value:?}"
                    )),
                }
            }
        }
        "--resolution-all" => {
            if let Some(value) = take_value(args, idx, "--resolution-all", alerts) {
                match ColorResolution::parse(value) {
                    Some(resolution) => settings.resolution_all = Some(resolution),
                    None => alerts.push(format!(
                        "--resolution-all must be one of {VALID_RESOLUTIONS}, got {value:?}"
                    )),
                }
            }
        }
        "--depth-mode" => {
            if let Some((serial, value)) = take_pair(args, idx, "--depth-mode", alerts) {
                check_serial(&serial, "--depth-mode");
                match DepthMode::parse(&value) {
                    Some(mode) => {
                        settings.overrides.entry(serial).or_default().depth_mode = Some(mode)
                    }
                    None => alerts.push(format!(
                        "--depth-mode must be one of {VALID_DEPTH_MODES}, got {value:?}"
                    )),
                }
            }
        }
        "--depth-mode-all" => {
            if let Some(value) = take_value(args, idx, "--depth-mode-all", alerts) {
                match DepthMode::parse(value) {
                    Some(mode) => settings.depth_mode_all = Some(mode),
                    None => alerts.push(format!(
                        "--depth-mode-all must be one of {VALID_DEPTH_MODES}, got {value:?}"
                    )),
                }
            }
        }
        "--exposure" => {
            if let Some(value) = take_value(args, idx, "--exposure", alerts) {
                match value.parse::<u32>() {
                    Ok(nanos) => settings.exposure_ns = nanos,
                    Err(_) => {
                        alerts.push(format!("--exposure must be an integer, got {value:?}"))
                    }
                }
            }
        }
        "--white-balance" => {
            if let Some(value) = take_value(args, idx, "--white-balance", alerts) {
                match value.parse::<u32>() {
                    Ok(kelvin) => settings.white_balance_k = kelvin,
                    Err(_) => alerts
                        .push(format!("--white-balance must be an integer, got {value:?}")),
                }
            }
        }
        "--verbose" => settings.verbose = true,
        _ => return false,
    }
    true
}

fn take_value<'a>(
    args: &'a [String],
    idx: &mut usize,
    flag: &str,
    alerts: &mut Vec<String>,
) -> Option<&'a str> {
    *idx += 1;
    match args.get(*idx) {
        Some(value) => Some(value.as_str()),
        None => {
            alerts.push(format!("{flag} requires a value"));
            None
        }
    }
}

fn take_pair(
    args: &[String],
    idx: &mut usize,
    flag: &str,
    alerts: &mut Vec<String>,
) -> Option<(String, String)> {
    let first = take_value(args, idx, flag, alerts)?.to_string();
    let second = take_value(args, idx, flag, alerts)?.to_string();
    Some((first, second))
}

fn check_serial(serial: &str, flag: &str) {
    if !serial.chars().all(|c| c.is_ascii_digit()) {
        warn!("{flag} serial number should probably just be digits, got {serial:?}");
    }
}

fn finish(alerts: Vec<String>, usage: &str) -> Result<()> {
    if alerts.is_empty() {
        return Ok(());
    }
    bail!("{}\n\n{usage}", alerts.join("\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tail: &[&str]) -> Vec<String> {
        let mut args = vec!["depthcloud".to_string(), "capture".to_string()];
        args.extend(tail.iter().map(|s| s.to_string()));
        args
    }

    #[test]
    fn batch_defaults() {
        let config = BatchConfig::from_args(&argv(&[])).unwrap();
        assert_eq!(config.output_template, "%s_%f.pts");
        assert_eq!(config.consecutive_count, 1);
        assert_eq!(config.wait_ms, 0);
        assert!(!config.keep_going);
        assert_eq!(config.settings.selection, DeviceSelection::Default);

        let stream = config.settings.resolved_stream("anything");
        assert_eq!(stream.color_resolution, ColorResolution::R3072p);
        assert_eq!(stream.depth_mode, DepthMode::WfovUnbinned);
        assert_eq!(stream.sync_mode, SyncMode::Standalone);
        assert_eq!(stream.fps, 5);
    }

    #[test]
    fn per_device_override_beats_global_override() {
        let config = BatchConfig::from_args(&argv(&[
            "--device",
            "111",
            "--device",
            "222",
            "--resolution",
            "111",
            "720p",
            "--resolution-all",
            "1080p",
            "--sync",
            "111",
            "master",
        ]))
        .unwrap();

        let first = config.settings.resolved_stream("111");
        assert_eq!(first.color_resolution, ColorResolution::R720p);
        assert_eq!(first.sync_mode, SyncMode::Master);

        let second = config.settings.resolved_stream("222");
        assert_eq!(second.color_resolution, ColorResolution::R1080p);
        assert_eq!(second.sync_mode, SyncMode::Standalone);
    }

    #[test]
    fn alerts_are_aggregated() {
        let err = BatchConfig::from_args(&argv(&[
            "--resolution-all",
            "4k",
            "--count",
            "three",
            "--frobnicate",
        ]))
        .unwrap_err();
        let message = format!("{err}");
        assert!(message.contains("--resolution-all must be one of"));
        assert!(message.contains("--count must be an integer"));
        assert!(message.contains("unrecognised flag: --frobnicate"));
    }

    #[test]
    fn count_is_clamped_to_at_least_one() {
        let config = BatchConfig::from_args(&argv(&["--count", "0"])).unwrap();
        assert_eq!(config.consecutive_count, 1);
    }

    #[test]
    fn device_and_all_devices_conflict() {
        let err = BatchConfig::from_args(&argv(&["--device", "111", "--all-devices"]))
            .unwrap_err();
        assert!(format!("{err}").contains("mutually exclusive"));
    }

    #[test]
    fn missing_trailing_value_is_an_alert() {
        let err = BatchConfig::from_args(&argv(&["--output"])).unwrap_err();
        assert!(format!("{err}").contains("--output requires a value"));
    }

    #[test]
    fn serve_defaults_and_overrides() {
        let args: Vec<String> = ["depthcloud", "serve"].iter().map(|s| s.to_string()).collect();
        let config = ServeConfig::from_args(&args).unwrap();
        assert_eq!(config.cache_frames, 64);
        assert_eq!(config.listen, "127.0.0.1:5687");

        let args: Vec<String> = [
            "depthcloud",
            "serve",
            "--cache-frames",
            "8",
            "--listen",
            "0.0.0.0:8080",
            "--device",
            "333",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let config = ServeConfig::from_args(&args).unwrap();
        assert_eq!(config.cache_frames, 8);
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert!(matches!(config.selector(), DeviceSelector::Serial(ref s) if s == "333"));
    }

    #[test]
    fn serve_rejects_multiple_devices() {
        let args: Vec<String> = ["depthcloud", "serve", "--device", "1", "--device", "2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(ServeConfig::from_args(&args).is_err());

        let args: Vec<String> = ["depthcloud", "serve", "--all-devices"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(ServeConfig::from_args(&args).is_err());
    }

    #[test]
    fn zero_cache_frames_is_rejected() {
        let args: Vec<String> = ["depthcloud", "serve", "--cache-frames", "0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(ServeConfig::from_args(&args).is_err());
    }
}
