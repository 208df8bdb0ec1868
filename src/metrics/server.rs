//! HTTP inspection endpoint.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::metrics::METRICS;
use crate::shutdown::Shutdown;

const INDEX: &str = r#"<!DOCTYPE html>
<html>
<head><title>pressure-lab</title></head>
<body>
<h1>pressure-lab</h1>
<p><a href="/metrics">Metrics (Prometheus format)</a></p>
<p><a href="/health">Health Check</a></p>
</body>
</html>"#;

/// Serve the inspection endpoint on `addr` until `shutdown` fires.
///
/// The server exposes:
/// - GET /metrics - lock contention and pool metrics, Prometheus format
/// - GET /health - health check
pub async fn run_metrics_server(addr: SocketAddr, mut shutdown: Shutdown) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, &mut shutdown).await;
    Ok(())
}

async fn serve(listener: TcpListener, shutdown: &mut Shutdown) {
    if let Ok(addr) = listener.local_addr() {
        info!("Inspection endpoint listening on http://{}/metrics", addr);
    }

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.recv() => {
                debug!("Inspection endpoint stopping");
                return;
            }
            conn = listener.accept() => match conn {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept inspection connection: {}", e);
                    continue;
                }
            },
        };

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(handle_request);

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Inspection connection error from {}: {}", remote_addr, e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path()))
}

fn route(method: &Method, path: &str) -> Response<Full<Bytes>> {
    let (status, content_type, body) = match (method, path) {
        (&Method::GET, "/metrics") => (
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Bytes::from(METRICS.snapshot().to_prometheus_string()),
        ),
        (&Method::GET, "/health") => (
            StatusCode::OK,
            "application/json",
            Bytes::from_static(b"{\"status\":\"ok\"}"),
        ),
        (&Method::GET, "/") => (StatusCode::OK, "text/html", Bytes::from_static(INDEX.as_bytes())),
        _ => (
            StatusCode::NOT_FOUND,
            "text/plain",
            Bytes::from_static(b"Not Found"),
        ),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_routes() {
        assert_eq!(route(&Method::GET, "/metrics").status(), StatusCode::OK);
        assert_eq!(route(&Method::GET, "/health").status(), StatusCode::OK);
        assert_eq!(route(&Method::GET, "/").status(), StatusCode::OK);
        assert_eq!(route(&Method::GET, "/nope").status(), StatusCode::NOT_FOUND);
        assert_eq!(route(&Method::POST, "/metrics").status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_health_and_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (trigger, mut listener_shutdown) = shutdown::channel();
        let server = tokio::spawn(async move { serve(listener, &mut listener_shutdown).await });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("{\"status\":\"ok\"}"));

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .unwrap()
            .unwrap();
    }
}
