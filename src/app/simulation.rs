use crate::device::MockDevice;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const OUTPUT_POLL: Duration = Duration::from_millis(100);

/// Stand-in for the actuator controller: sends the trigger token every
/// `interval` and logs whatever the link writes back.
pub async fn run_simulated_controller(
    device: MockDevice,
    trigger: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(
        "Simulated controller sending {:?} every {:?}",
        trigger, interval
    );

    let mut trigger_timer = tokio::time::interval(interval.max(OUTPUT_POLL));
    let mut output_timer = tokio::time::interval(OUTPUT_POLL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = trigger_timer.tick() => {
                debug!("Simulated controller sending trigger");
                device.push_line(&trigger);
            }
            _ = output_timer.tick() => {
                for received in device.take_written() {
                    info!("Simulated controller received {:?}", received);
                }
            }
        }
    }

    debug!("Simulated controller stopped");
}
