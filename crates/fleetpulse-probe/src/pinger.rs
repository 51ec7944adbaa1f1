//! Batched ping sweeps.
//!
//! One `fping` invocation covers a whole group: every address goes on
//! the command line and the per-target summary lines come back on
//! stderr. Unparseable lines are skipped, not errors; addresses absent
//! from the output are handled upstream as unreachable stand-ins.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use fleetpulse_core::ProbeResult;

/// Boxed future so the pinger stays object-safe behind `Arc<dyn Pinger>`.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Errors from issuing a batched probe.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("failed to launch ping tool: {0}")]
    Spawn(String),
}

/// A batched reachability probe: one call for all addresses at once.
pub trait Pinger: Send + Sync {
    fn probe(&self, ips: Vec<String>) -> BoxFuture<Result<Vec<ProbeResult>, PingError>>;
}

/// Probes by shelling out to `fping`.
pub struct FpingPinger {
    binary: String,
    timeout_ms: u64,
}

impl FpingPinger {
    pub fn new(binary: &str, timeout_ms: u64) -> Self {
        Self {
            binary: binary.to_string(),
            timeout_ms,
        }
    }
}

impl Pinger for FpingPinger {
    fn probe(&self, ips: Vec<String>) -> BoxFuture<Result<Vec<ProbeResult>, PingError>> {
        let binary = self.binary.clone();
        let timeout_ms = self.timeout_ms;
        Box::pin(async move {
            if ips.is_empty() {
                return Ok(Vec::new());
            }
            let output = Command::new(&binary)
                .arg("-c")
                .arg("1")
                .arg("-t")
                .arg(timeout_ms.to_string())
                .arg("-q")
                .args(&ips)
                .output()
                .await
                .map_err(|e| PingError::Spawn(e.to_string()))?;

            // fping exits non-zero when any target is unreachable;
            // only a failed launch is an error. Summaries are on stderr.
            let text = String::from_utf8_lossy(&output.stderr);
            let results: Vec<ProbeResult> = text.lines().filter_map(parse_fping_line).collect();
            debug!(
                targets = ips.len(),
                parsed = results.len(),
                "batched probe complete"
            );
            Ok(results)
        })
    }
}

/// Parse one `fping -c1 -q` summary line.
///
/// ```text
/// 10.0.0.1 : xmt/rcv/%loss = 1/1/0%, min/avg/max = 0.43/0.43/0.43
/// 10.0.0.2 : xmt/rcv/%loss = 1/0/100%
/// ```
///
/// Returns `None` for anything that doesn't fit; callers skip those.
pub fn parse_fping_line(line: &str) -> Option<ProbeResult> {
    let (ip, rest) = line.split_once(" : ")?;
    let ip = ip.trim();
    if ip.is_empty() {
        return None;
    }

    let mut sections = rest.split(", ");
    let loss = sections.next()?;
    let counters = loss.split_once('=')?.1.trim();
    let mut counts = counters.split('/');
    let _xmt = counts.next()?;
    let rcv: u32 = counts.next()?.parse().ok()?;

    let alive = rcv > 0;
    let latency_ms = if alive {
        let rtt = sections.next()?;
        let values = rtt.split_once('=')?.1.trim();
        let mut fields = values.split('/');
        let _min = fields.next()?;
        fields.next()?.parse().ok()?
    } else {
        0.0
    };

    Some(ProbeResult {
        ip: ip.to_string(),
        alive,
        latency_ms,
    })
}
