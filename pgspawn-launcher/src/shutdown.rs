//! Operator stop signal
//!
//! Ctrl-C or SIGTERM detaches the launcher from its job. Before the job
//! runs that aborts the launch; while tailing it ends the run normally.
//! The Slurm job itself is left alone either way.

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returns a token cancelled on the first SIGINT or SIGTERM
///
/// Both handlers are registered before this returns, so a registration
/// failure surfaces here rather than in the background task.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let stop = CancellationToken::new();

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    let trigger = stop.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        };
        info!("{} received, detaching from the job", name);
        trigger.cancel();
    });

    Ok(stop)
}
