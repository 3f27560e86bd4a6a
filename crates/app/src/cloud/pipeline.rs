//! Streaming pipeline orchestration: one capture thread writing into the
//! frame cache, the HTTP facade reading from it, and cooperative shutdown
//! wired through a shared flag plus an event channel.

use std::sync::{
    Arc, Once,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use depth_ingest::CameraSession;
use tracing::{info, warn};

use crate::cloud::{
    cache::FrameCache,
    capture::{PipelineEvent, spawn_capture_loop},
    config::ServeConfig,
    server::spawn_stream_server,
};

pub(crate) fn run(config: &ServeConfig) -> Result<()> {
    let selector = config.selector();
    let mut session = CameraSession::open(&selector)
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
            .with_context(|| format!("failed to set white balance on {}", session.serial()))?;
    }
    info!(
        "streaming device {} ({}, {}, {})",
        session.serial(),
        stream.color_resolution.label(),
        stream.depth_mode.label(),
        stream.sync_mode.label()
    );

    let cache = Arc::new(FrameCache::new(config.cache_frames));
    let shutdown = Arc::new(AtomicBool::new(false));
    let (event_tx, event_rx) = crossbeam_channel::unbounded::<PipelineEvent>();

    static CTRL_HANDLER: Once = Once::new();
    let handler_shutdown = shutdown.clone();
    let handler_events = event_tx.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
            let _ = handler_events.send(PipelineEvent::ShutdownRequested);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let server = spawn_stream_server(
        &config.listen,
        cache.clone(),
        shutdown.clone(),
        event_tx.clone(),
    )?;
    let capture = spawn_capture_loop(session, cache.clone(), shutdown.clone(), event_tx.clone())
        .context("failed to spawn capture thread")?;

    info!("serving point clouds on http://{}", config.listen);
    if config.settings.verbose {
        info!("cache holds up to {} frames; GET /close to stop", cache.capacity());
    }

    let mut capture_error = None;
    loop {
        match event_rx.recv() {
            Ok(PipelineEvent::ShutdownRequested) => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(PipelineEvent::CaptureFailed(err)) => {
                shutdown.store(true, Ordering::SeqCst);
                capture_error = Some(err);
                break;
            }
            // The loop only stops once shutdown is already raised.
            Ok(PipelineEvent::CaptureStopped) => break,
            Err(_) => break,
        }
    }

    info!("Stopping stream pipeline");
    server.stop();
    let _ = capture.join();

    // A device fault may have raced the shutdown request.
    if capture_error.is_none() {
        while let Ok(event) = event_rx.try_recv() {
            if let PipelineEvent::CaptureFailed(err) = event {
                capture_error = Some(err);
            }
        }
    }
    if let Some(err) = capture_error {
        return Err(err).context("capture loop aborted");
    }
    Ok(())
}
