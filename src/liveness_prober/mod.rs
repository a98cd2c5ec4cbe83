//! LivenessProber - bounded reachability checks
//!
//! - Host endpoints: a TCP connect must complete within the timeout
//! - Camera endpoints: TCP connect + RTSP OPTIONS answered with 200
//!
//! The whole attempt (connect, request, response) runs under one hard
//! deadline. Network failure is a normal `false`, never an error.

pub mod endpoint;

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use endpoint::ProbeTarget;

/// Default probe deadline (5 seconds)
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on bytes read while looking for the status line
const MAX_STATUS_LINE: u64 = 1024;

/// Liveness check seam
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// True when `endpoint` answered within `timeout`
    async fn probe(&self, endpoint: &str, timeout: Duration) -> bool;
}

/// Why a probe came back negative (logged only)
#[derive(Debug)]
enum ProbeFailure {
    Connect(std::io::Error),
    Io(std::io::Error),
    NoResponse,
    Status(String),
}

/// TCP/RTSP implementation of LivenessProbe
#[derive(Debug, Clone, Default)]
pub struct NetworkProber;

impl NetworkProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LivenessProbe for NetworkProber {
    async fn probe(&self, endpoint: &str, deadline: Duration) -> bool {
        let Some(target) = ProbeTarget::parse(endpoint) else {
            warn!("LivenessProber: Unparseable endpoint, treating as offline");
            return false;
        };

        let start = Instant::now();
        match timeout(deadline, probe_target(&target)).await {
            Ok(Ok(())) => {
                debug!(
                    target = %target,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "LivenessProber: Online"
                );
                true
            }
            Ok(Err(failure)) => {
                debug!(target = %target, failure = ?failure, "LivenessProber: Offline");
                false
            }
            Err(_) => {
                debug!(
                    target = %target,
                    timeout_ms = deadline.as_millis() as u64,
                    "LivenessProber: Timed out"
                );
                false
            }
        }
    }
}

async fn probe_target(target: &ProbeTarget) -> Result<(), ProbeFailure> {
    let mut stream = TcpStream::connect((target.host(), target.port()))
        .await
        .map_err(ProbeFailure::Connect)?;

    let url = match target {
        ProbeTarget::Tcp { .. } => return Ok(()),
        ProbeTarget::Rtsp { url, .. } => url,
    };

    let request = format!(
        "OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: beacon-agent/{}\r\n\r\n",
        url,
        env!("CARGO_PKG_VERSION")
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(ProbeFailure::Io)?;

    // The status line may arrive over several segments
    let mut reader = BufReader::new(stream).take(MAX_STATUS_LINE);
    let mut status_line = String::new();
    let n = reader
        .read_line(&mut status_line)
        .await
        .map_err(ProbeFailure::Io)?;
    if n == 0 {
        return Err(ProbeFailure::NoResponse);
    }

    let status_line = status_line.trim_end();
    if is_rtsp_ok(status_line) {
        Ok(())
    } else {
        Err(ProbeFailure::Status(status_line.to_string()))
    }
}

/// `RTSP/1.0 200 OK`
fn is_rtsp_ok(status_line: &str) -> bool {
    let mut parts = status_line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(version), Some("200")) if version.starts_with("RTSP/")
    )
}
