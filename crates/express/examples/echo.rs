//! Feeds a few in-memory requests through the adapter the way a router would:
//! construct inside the native callback, touch route params, then read the body.

use std::sync::Arc;
use std::time::Duration;

use micro_express::{AppConfig, BodyError, Event, EventKind, RequestAdapter};
use micro_native::memory::{MemoryRequest, MemoryResponse, PayloadWriter};
use micro_native::route_param_names;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const ROUTE: &str = "/echo/:name";

fn native_request(url: &str, body_chunks: &[&'static str], finish: bool) -> (MemoryRequest, MemoryResponse, PayloadWriter) {
    let native = MemoryRequest::builder()
        .method("post")
        .url(url)
        .route(ROUTE)
        .header("Content-Type", "text/plain")
        .header("Referer", "http://localhost/")
        .build()
        .expect("valid demo route");

    let (response, writer) = MemoryResponse::new("127.0.0.1");
    for chunk in body_chunks {
        writer.write(*chunk);
    }
    if finish {
        writer.finish("");
    }
    (native, response, writer)
}

async fn handle(app: &Arc<AppConfig>, url: &str, body_chunks: &[&'static str], finish: bool) {
    let (native, response, _writer) = native_request(url, body_chunks, finish);

    let raw_path = native.url();
    let mut req = RequestAdapter::new(native.clone(), response, raw_path, route_param_names(ROUTE), Arc::clone(app));
    let name = req.param("name").unwrap_or_default().to_owned();
    // the native callback returns here, the handle is gone from now on
    native.invalidate();

    req.set_base_url("/echo");
    info!(name = %name, path = %req.path(), query = ?req.query(), referrer = ?req.header("referrer"), "handling request");

    match req.read_body().await {
        Ok(has_body) => {
            req.on(EventKind::Data, |event| {
                if let Event::Data(bytes) = event {
                    info!(body = %String::from_utf8_lossy(bytes), "replayed body");
                }
            });
            info!(has_body, "echo {}", req.raw_body().unwrap_or_default());
        }
        Err(BodyError::TimedOut { partial, timeout }) => {
            warn!(received = partial.len(), ?timeout, "gave up waiting for body");
        }
        Err(e) => error!(cause = %e, "can't read body"),
    }

    // let the replayed events run
    tokio::task::yield_now().await;
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let app = Arc::new(AppConfig::builder().body_timeout(Duration::from_millis(200)).build());

    handle(&app, "/echo/ada?lang=en&lang=fr", &["hello ", "world"], true).await;
    handle(&app, "/echo/grace", &["never ", "finished"], false).await;
}
