use super::startup::{CAMERA, COLLECTOR, DEVICE_LINK, HTTP, SIMULATOR};
use super::{ComponentState, SortcamOrchestrator};
use crate::error::Result;
use std::time::Duration;
use tracing::{error, info};

/// Reverse dependency order with per-component stop timeouts
const SHUTDOWN_ORDER: [(&str, Duration); 5] = [
    (HTTP, Duration::from_secs(5)),
    (SIMULATOR, Duration::from_secs(2)),
    (COLLECTOR, Duration::from_secs(5)),
    (DEVICE_LINK, Duration::from_secs(5)),
    (CAMERA, Duration::from_secs(10)),
];

impl SortcamOrchestrator {
    /// Stop every component in reverse dependency order. Returns 1 if any
    /// component failed to stop cleanly.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;
        for (component, timeout) in SHUTDOWN_ORDER {
            if let Err(e) = self.stop_component(component, timeout).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        // Anything spawned outside the named workers
        self.cancellation_token.cancel();

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&mut self, component: &str, timeout: Duration) -> Result<()> {
        let Some(mut worker) = self.workers.remove(component) else {
            if self.get_component_state(component).await.is_some() {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
            }
            return Ok(());
        };

        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match worker.stop(timeout).await {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
        }
    }
}
