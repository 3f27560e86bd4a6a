//! Actix Web facade exposing the frame cache to concurrent readers.
//!
//! The server runs on a dedicated thread so the capture hot path never
//! touches the Actix runtime. Construction never blocks; shutdown is an
//! explicit `stop()` call or a `GET /close` from a client, both of which
//! resolve to the same oneshot trigger and are idempotent.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use actix_web::{App, HttpResponse, HttpServer, web};
use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::error;

use crate::cloud::cache::FrameCache;
use crate::cloud::capture::PipelineEvent;

const OCTET_STREAM: &str = "application/octet-stream";

/// Shared state backing the HTTP handlers.
struct ServerState {
    cache: Arc<FrameCache>,
    shutdown: Arc<AtomicBool>,
    events: Sender<PipelineEvent>,
    stop: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Handle for the facade thread.
pub(crate) struct StreamServer {
    stop: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl StreamServer {
    /// Signal the listener to stop and block until the thread exits.
    /// Safe to call after a client already closed the server.
    pub(crate) fn stop(mut self) {
        trigger_stop(&self.stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn trigger_stop(stop: &Mutex<Option<oneshot::Sender<()>>>) {
    let sender = match stop.lock() {
        Ok(mut guard) => guard.take(),
        Err(_) => None,
    };
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
}

/// Spawn the facade thread serving the cache on `listen`.
pub(crate) fn spawn_stream_server(
    listen: &str,
    cache: Arc<FrameCache>,
    shutdown: Arc<AtomicBool>,
    events: Sender<PipelineEvent>,
) -> Result<StreamServer> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let stop = Arc::new(Mutex::new(Some(stop_tx)));

    let listen = listen.to_string();
    let thread_stop = stop.clone();
    let thread_events = events.clone();
    let handle = std::thread::Builder::new()
        .name("cloud-stream-server".into())
        .spawn(move || {
            let outcome = actix_web::rt::System::new().block_on(async move {
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(web::Data::new(ServerState {
                            cache: cache.clone(),
                            shutdown: shutdown.clone(),
                            events: events.clone(),
                            stop: thread_stop.clone(),
                        }))
                        .route("/status", web::get().to(status_handler))
                        .route("/frames", web::get().to(frames_handler))
                        .route("/frame/latest", web::get().to(latest_handler))
                        .route("/frame/{number:\\d+}", web::get().to(frame_handler))
                        .route("/close", web::get().to(close_handler))
                })
                .disable_signals()
                .bind(listen.as_str())?
                .run();

                let srv_handle = server.handle();
                actix_web::rt::spawn(async move {
                    let _ = stop_rx.await;
                    srv_handle.stop(true).await;
                });

                server.await
            });
            if let Err(err) = outcome {
                error!("stream server error: {err}");
                // Without a listener there is nothing left to serve; let
                // the orchestrator unwind the pipeline.
                let _ = thread_events.send(PipelineEvent::ShutdownRequested);
            }
        })
        .context("failed to spawn stream server thread")?;

    Ok(StreamServer {
        stop,
        handle: Some(handle),
    })
}

#[derive(Serialize)]
struct StatusBody {
    #[serde(rename = "cache frames")]
    cache_frames: usize,
}

/// Newline-separated decimal frame numbers, oldest first.
fn render_frame_list(cache: &FrameCache) -> String {
    let mut out = String::new();
    for number in cache.frame_numbers() {
        out.push_str(&number.to_string());
        out.push('\n');
    }
    out
}

async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(StatusBody {
        cache_frames: state.cache.capacity(),
    })
}

async fn frames_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain")
        .body(render_frame_list(&state.cache))
}

async fn frame_handler(path: web::Path<u64>, state: web::Data<ServerState>) -> HttpResponse {
    match state.cache.get(path.into_inner()) {
        Some(buffer) => HttpResponse::Ok().content_type(OCTET_STREAM).body(buffer),
        None => HttpResponse::NotFound().finish(),
    }
}

async fn latest_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.cache.latest() {
        Some(buffer) => HttpResponse::Ok().content_type(OCTET_STREAM).body(buffer),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn close_handler(state: web::Data<ServerState>) -> HttpResponse {
    state.shutdown.store(true, Ordering::SeqCst);
    let _ = state.events.send(PipelineEvent::ShutdownRequested);
    trigger_stop(&state.stop);
    HttpResponse::Ok().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn status_body_uses_the_wire_field_name() {
        let body = serde_json::to_value(StatusBody { cache_frames: 60 }).unwrap();
        assert_eq!(body, serde_json::json!({ "cache frames": 60 }));
    }

    #[test]
    fn frame_list_is_newline_separated_oldest_first() {
        let cache = FrameCache::new(2);
        assert_eq!(render_frame_list(&cache), "");
        cache.insert(Bytes::from_static(b"a"));
        cache.insert(Bytes::from_static(b"b"));
        cache.insert(Bytes::from_static(b"c"));
        assert_eq!(render_frame_list(&cache), "1\n2\n");
    }

    #[test]
    fn stop_trigger_is_idempotent() {
        let (tx, mut rx) = oneshot::channel::<()>();
        let stop = Mutex::new(Some(tx));
        trigger_stop(&stop);
        trigger_stop(&stop);
        assert!(rx.try_recv().is_ok());
    }
}
