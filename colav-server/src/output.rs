//! Writes every published cycle report to stdout, one JSON object per line.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use colav_core::CycleReport;
use log::{debug, info, warn};
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio_graceful_shutdown::SubsystemHandle;

use crate::ServerError;

/// Serialize one report as a single line
pub fn to_line(report: &CycleReport) -> Result<String, ServerError> {
    Ok(serde_json::to_string(report)?)
}

fn write_line<W: Write>(out: &mut W, report: &CycleReport) -> Result<(), ServerError> {
    let line = to_line(report)?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}

/// Write reports to `out` until `shutdown` completes or the channel closes.
///
/// Reports already queued when shutdown is requested are still written;
/// the engine publishes its last cycle right before requesting shutdown.
pub async fn write_reports<W: Write>(
    shutdown: impl Future<Output = ()>,
    rx_reports: &mut broadcast::Receiver<Arc<CycleReport>>,
    out: &mut W,
) -> Result<u64, ServerError> {
    let mut written = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            r = rx_reports.recv() => {
                match r {
                    Ok(report) => {
                        write_line(out, &report)?;
                        written += 1;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Output: Skipped {} cycle reports", n);
                    }
                    Err(RecvError::Closed) => {
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                loop {
                    match rx_reports.try_recv() {
                        Ok(report) => {
                            write_line(out, &report)?;
                            written += 1;
                        }
                        Err(TryRecvError::Lagged(n)) => {
                            warn!("Output: Skipped {} cycle reports", n);
                        }
                        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                    }
                }
                break;
            }
        }
    }
    Ok(written)
}

pub async fn run(
    subsys: SubsystemHandle,
    mut rx_reports: broadcast::Receiver<Arc<CycleReport>>,
) -> Result<(), ServerError> {
    info!("Output: Starting");
    let mut stdout = std::io::stdout();
    let written =
        write_reports(subsys.on_shutdown_requested(), &mut rx_reports, &mut stdout).await?;
    debug!("Output: Wrote {} cycle reports", written);
    Ok(())
}
