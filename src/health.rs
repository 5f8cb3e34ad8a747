// ============================================================================
// Health & Metrics Endpoint
// ============================================================================
//
// GET /health  -> 200 "OK" when the proof store is usable, 503 otherwise
// GET /metrics -> Prometheus text exposition
//
// ============================================================================

use crate::proof_store::ProofStore;
use anyhow::Result;
use blocketch_error::StampResult;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body::Incoming as IncomingBody, header};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

type HttpResult = Result<Response<Full<Bytes>>, Infallible>;

pub async fn health_check(store: &dyn ProofStore) -> StampResult<()> {
    store.ping().await
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(body.into()));
    *res.status_mut() = status;
    res
}

async fn http_handler(req: Request<IncomingBody>, store: Arc<dyn ProofStore>) -> HttpResult {
    let response = match req.uri().path() {
        "/health" => match health_check(store.as_ref()).await {
            Ok(()) => text_response(StatusCode::OK, "OK"),
            Err(e) => {
                tracing::error!(error = %e, "Health check failed");
                text_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
        },
        "/metrics" => match blocketch_metrics::gather_metrics() {
            Ok(metrics_data) => {
                let mut res = text_response(StatusCode::OK, metrics_data);
                res.headers_mut().insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static("text/plain; version=0.0.4"),
                );
                res
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to gather metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        },
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

/// Bind `0.0.0.0:{port}` and serve until the task is dropped
pub async fn run_http_server(port: u16, store: Arc<dyn ProofStore>) -> Result<()> {
    let http_addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&http_addr).await?;
    tracing::info!("HTTP server listening on http://{}", http_addr);
    serve_http(listener, store).await
}

pub async fn serve_http(listener: TcpListener, store: Arc<dyn ProofStore>) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let store = store.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| http_handler(req, store.clone()));

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Error serving HTTP connection: {:?}", err);
            }
        });
    }
}
