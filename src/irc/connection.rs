use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::composer::MessagePlan;

/// Timing rules applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Pause after the last line so the client can drain buffered bytes.
    pub linger: Duration,
    /// Upper bound on write + linger. `None` waits forever on a stalled peer.
    pub timeout: Option<Duration>,
}

/// How a session ended. The connection is closed in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every line was written and the linger delay elapsed.
    Delivered,
    /// A write failed; remaining lines were skipped.
    WriteFailed,
    /// The session deadline expired before delivery finished.
    TimedOut,
}

/// Handle a single redirect session from accept to close: write the plan
/// line by line, linger, then shut the stream down.
pub async fn handle_connection<S>(
    mut stream: S,
    plan: MessagePlan,
    policy: SessionPolicy,
    peer: SocketAddr,
) -> SessionOutcome
where
    S: AsyncWrite + Unpin,
{
    let delivery = deliver(&mut stream, &plan, policy.linger);

    let outcome = match policy.timeout {
        Some(limit) => match tokio::time::timeout(limit, delivery).await {
            Ok(result) => result.into(),
            Err(_) => {
                debug!(%peer, timeout = ?limit, "session deadline expired");
                SessionOutcome::TimedOut
            }
        },
        None => delivery.await.into(),
    };

    if let SessionOutcome::WriteFailed = outcome {
        debug!(%peer, "write failed, closing session");
    }

    // Errors here mean the peer is already gone.
    let _ = stream.shutdown().await;
    drop(stream);

    debug!(%peer, ?outcome, "session closed");
    outcome
}

async fn deliver<S>(stream: &mut S, plan: &MessagePlan, linger: Duration) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    for line in plan.lines() {
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
    }
    tokio::time::sleep(linger).await;
    Ok(())
}

impl From<io::Result<()>> for SessionOutcome {
    fn from(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => SessionOutcome::Delivered,
            Err(_) => SessionOutcome::WriteFailed,
        }
    }
}
