use super::{ShutdownReason, SortcamOrchestrator};
use crate::error::{Result, SortcamError};
use crate::events::SortcamEvent;
use std::time::SystemTime;
use tracing::{info, warn};

impl SortcamOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down
    /// gracefully and return the exit code. A shutdown caused by a fatal
    /// component error exits with 1.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Sortcam system is running");

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| SortcamError::system("Shutdown receiver already taken"))?;

        let requested = async {
            match shutdown_receiver.recv().await {
                Some(reason) => reason,
                // All senders dropped: only signals can stop us now
                None => std::future::pending().await,
            }
        };

        let shutdown_reason = tokio::select! {
            reason = requested => reason,
            signal = wait_for_signal() => ShutdownReason::Signal(signal),
        };

        info!("Shutdown initiated: {}", shutdown_reason);
        self.event_bus.publish(SortcamEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: shutdown_reason.to_string(),
        });

        let mut exit_code = self.shutdown().await?;
        if matches!(shutdown_reason, ShutdownReason::Error(_)) {
            exit_code = exit_code.max(1);
        }

        info!("Sortcam system shutdown complete");
        Ok(exit_code)
    }
}

/// Resolve with the name of the first termination signal received
async fn wait_for_signal() -> String {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        return "SIGTERM".to_string();
                    }
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received SIGINT signal (Ctrl+C)");
    "SIGINT".to_string()
}
