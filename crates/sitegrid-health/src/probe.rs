//! Port and health probes against local services.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use http_body_util::BodyExt;
use tracing::debug;

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// 2xx with `{"status": "ok"}`.
    Healthy,
    /// Answered, but not healthy (non-2xx, bad body, or another status).
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

fn local(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Whether something accepts TCP connections on `127.0.0.1:port`.
pub async fn check_port(port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(local(port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!(port, error = %e, "port closed");
            false
        }
        Err(_) => {
            debug!(port, "port check timed out");
            false
        }
    }
}

/// GET `path` on `127.0.0.1:port` and require a healthy JSON answer.
pub async fn check_health(port: u16, path: &str, timeout: Duration) -> ProbeResult {
    let address = local(port);

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %address, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %address, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", address.to_string())
            .header("user-agent", "sitegrid-health/0.1")
            .header("accept", "application/json")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, path, "invalid health probe request");
                return ProbeResult::Failed;
            }
        };

        let resp = match sender.send_request(req).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, %address, "health probe request failed");
                return ProbeResult::Failed;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, %address, "health probe non-2xx");
            return ProbeResult::Unhealthy;
        }

        let body = match resp.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                debug!(error = %e, %address, "health probe body read failed");
                return ProbeResult::Failed;
            }
        };
        if reports_ok(&body) {
            ProbeResult::Healthy
        } else {
            debug!(body = %String::from_utf8_lossy(&body), %address, "health body not ok");
            ProbeResult::Unhealthy
        }
    })
    .await;

    match result {
        Ok(probe) => probe,
        Err(_) => {
            debug!(%address, "health probe timed out");
            ProbeResult::Failed
        }
    }
}

fn reports_ok(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(|s| s == "ok"))
        .unwrap_or(false)
}
