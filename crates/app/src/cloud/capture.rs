//! Single-producer capture loop feeding the frame cache.

use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::Sender;
use depth_ingest::{CameraSession, DeviceError};
use tracing::{debug, error};

use crate::cloud::{cache::FrameCache, encoder, telemetry};

/// Events the pipeline threads report back to the orchestrator.
pub(crate) enum PipelineEvent {
    /// Somebody asked for a cooperative shutdown (Ctrl+C or `GET /close`).
    ShutdownRequested,
    /// The capture loop observed the stop flag and exited cleanly.
    CaptureStopped,
    /// The capture loop hit a hard device fault and terminated.
    CaptureFailed(DeviceError),
}

/// Spawn the capture thread: acquire, encode, insert, until the stop flag
/// is raised or the device faults.
///
/// The stop flag is observed at the top of each iteration only; an
/// in-flight capture+encode always completes first. Encoding runs before
/// the cache lock is taken, so readers are never blocked by it.
pub(crate) fn spawn_capture_loop(
    mut session: CameraSession,
    cache: Arc<FrameCache>,
    shutdown: Arc<AtomicBool>,
    events: Sender<PipelineEvent>,
) -> io::Result<JoinHandle<()>> {
    telemetry::spawn_thread("cloud-capture", move || {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            // Blocks until the camera paces out the next frame.
            let frame = match session.next_aligned() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    // Dropped or malformed sample; nothing to encode.
                    metrics::counter!("cloud_capture_skipped_total").increment(1);
                    continue;
                }
                Err(err) => {
                    error!("capture failed on device {}: {err}", session.serial());
                    let _ = events.send(PipelineEvent::CaptureFailed(err));
                    return;
                }
            };

            let encode_start = Instant::now();
            let buffer = encoder::encode_binary(&frame);
            metrics::histogram!("cloud_encode_seconds")
                .record(encode_start.elapsed().as_secs_f64());
            metrics::counter!("cloud_capture_frames_total").increment(1);

            let points = encoder::point_count(&buffer);
            let number = cache.insert(buffer);
            if number % 30 == 0 {
                debug!(
                    "capture heartbeat: frame #{number}, {points} points, ts={}",
                    frame.timestamp_ms
                );
            }
        }
        let _ = events.send(PipelineEvent::CaptureStopped);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_ingest::{
        AlignedFrame, DeviceBackend, RawCapture, StreamConfig, SyntheticBackend,
    };
    use std::time::Duration;

    fn start_synthetic(width: u32, height: u32) -> CameraSession {
        let mut session =
            CameraSession::from_backend(Box::new(SyntheticBackend::with_grid("cap", width, height)));
        session
            .start(&StreamConfig {
                fps: 30,
                ..StreamConfig::default()
            })
            .unwrap();
        session
    }

    fn wait_for(cache: &FrameCache, frames: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.len() < frames {
            assert!(Instant::now() < deadline, "capture loop made no progress");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn loop_fills_cache_and_stops_on_request() {
        let cache = Arc::new(FrameCache::new(4));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let handle = spawn_capture_loop(
            start_synthetic(16, 12),
            cache.clone(),
            shutdown.clone(),
            events_tx,
        )
        .unwrap();

        wait_for(&cache, 3);
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        let stopped = events_rx
            .iter()
            .any(|event| matches!(event, PipelineEvent::CaptureStopped));
        assert!(stopped);
        assert!(cache.latest().is_some());
        let numbers = cache.frame_numbers();
        assert!(numbers.windows(2).all(|pair| pair[1] == pair[0] + 1));
    }

    /// Backend that yields one malformed sample, one good frame, then a
    /// hard fault.
    struct FlakyBackend {
        calls: u32,
    }

    impl DeviceBackend for FlakyBackend {
        fn serial(&self) -> &str {
            "flaky"
        }

        fn start(&mut self, _config: &StreamConfig) -> Result<(), DeviceError> {
            Ok(())
        }

        fn next_capture(&mut self) -> Result<Option<RawCapture>, DeviceError> {
            self.calls += 1;
            match self.calls {
                1 => Ok(None),
                2 => {
                    let mut inner = SyntheticBackend::with_grid("flaky", 8, 8);
                    inner.start(&StreamConfig::default()).unwrap();
                    inner.next_capture()
                }
                _ => Err(DeviceError::Capture {
                    serial: "flaky".into(),
                }),
            }
        }

        fn align(&self, capture: &RawCapture) -> Result<AlignedFrame, DeviceError> {
            SyntheticBackend::with_grid("flaky", 8, 8).align(capture)
        }

        fn set_exposure(&mut self, _nanos: u32) -> Result<(), DeviceError> {
            Ok(())
        }

        fn set_white_balance(&mut self, _kelvin: u32) -> Result<(), DeviceError> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    #[test]
    fn malformed_capture_is_skipped_and_device_fault_is_fatal() {
        let cache = Arc::new(FrameCache::new(4));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        let mut session = CameraSession::from_backend(Box::new(FlakyBackend { calls: 0 }));
        session.start(&StreamConfig::default()).unwrap();

        let handle = spawn_capture_loop(session, cache.clone(), shutdown, events_tx).unwrap();
        handle.join().unwrap();

        // The malformed sample produced no cache entry; the good one did.
        assert_eq!(cache.len(), 1);
        let failed = events_rx
            .iter()
            .any(|event| matches!(event, PipelineEvent::CaptureFailed(_)));
        assert!(failed);
    }
}
