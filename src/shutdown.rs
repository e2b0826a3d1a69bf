//! Stop a sync run between batches.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the token handed to
//! [`crate::sync::run_sync`]. Units already admitted in the current batch run
//! to completion, every work not yet admitted is reported as interrupted, and
//! CLASSIFY stops deleting local archives. The next run picks those works up
//! again. A second signal exits immediately with status 130.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

const FORCE_EXIT_CODE: i32 = 130;

/// What a received signal asks of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalResponse {
    /// Finish the batch in flight, then stop.
    Drain,
    /// Leave now, abandoning whatever is in flight.
    Exit,
}

/// Response to the `seen`-th signal (0-based).
fn respond_to(seen: u32) -> SignalResponse {
    if seen == 0 {
        SignalResponse::Drain
    } else {
        SignalResponse::Exit
    }
}

#[cfg(unix)]
struct SignalListener {
    sigterm: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    async fn next(&mut self) -> std::io::Result<()> {
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = self.sigterm.recv() => Ok(()),
            _ = self.sighup.recv() => Ok(()),
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> std::io::Result<()> {
        tokio::signal::ctrl_c().await
    }
}

/// Register the signal listeners and return the token the sync engine
/// watches. Registration failures are returned rather than leaving the run
/// without a way to stop cleanly.
pub(crate) fn install_signal_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let seen = Arc::new(AtomicU32::new(0));
    let mut listener = SignalListener::register()?;

    let handler_token = token.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = listener.next().await {
                tracing::warn!("Stopped listening for shutdown signals: {}", e);
                return;
            }
            match respond_to(seen.fetch_add(1, Ordering::SeqCst)) {
                SignalResponse::Drain => {
                    tracing::info!(
                        "Shutdown requested: finishing the works already in flight, the rest wait for the next run"
                    );
                    tracing::info!("Press Ctrl+C again to quit immediately");
                    handler_token.cancel();
                }
                SignalResponse::Exit => {
                    tracing::warn!("Second shutdown signal, exiting without waiting for the batch");
                    std::process::exit(FORCE_EXIT_CODE);
                }
            }
        }
    });

    Ok(token)
}
