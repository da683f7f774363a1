//! Background pose updates for an active controller
//!
//! Each active controller owns one dedicated thread that re-derives its pose
//! from the headset and submits it to the host, then sleeps for the update
//! interval. Cancellation is cooperative: the token is checked at the top of
//! every iteration, so a stop request is observed within one interval.

use crate::error::DriverError;
use crate::host::{ControllerRole, DeviceIndex, DriverHost};
use crate::pose::synthesize_pose;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Handle to a running pose update thread.
///
/// The token is shared with the owner, which may cancel it before stopping
/// the handle. Stopping (or dropping) the handle cancels the token and joins
/// the thread, so once it returns the thread no longer submits poses for its
/// index.
#[derive(Debug)]
pub struct PoseUpdateTask {
    name: String,
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl PoseUpdateTask {
    pub fn spawn(
        role: ControllerRole,
        index: DeviceIndex,
        host: Arc<dyn DriverHost>,
        interval: Duration,
        token: CancellationToken,
    ) -> Result<Self, DriverError> {
        let name = format!("{}-pose-update", role.label().to_lowercase());
        let loop_token = token.clone();

        debug!("Spawning {} with interval {:?}", name, interval);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_pose_loop(loop_token, role, index, host, interval))?;

        Ok(Self {
            name,
            token,
            thread: Some(thread),
        })
    }

    /// Cancels the loop and blocks until the thread has exited.
    pub fn stop(mut self) {
        self.cancel_and_join();
    }

    fn cancel_and_join(&mut self) {
        self.token.cancel();

        let Some(thread) = self.thread.take() else {
            return;
        };

        // Never join from the pose thread itself
        if thread.thread().id() == thread::current().id() {
            return;
        }

        match thread.join() {
            Ok(()) => debug!("{} joined", self.name),
            Err(_) => error!("{} panicked", self.name),
        }
    }
}

impl Drop for PoseUpdateTask {
    fn drop(&mut self) {
        self.cancel_and_join();
    }
}

fn run_pose_loop(
    token: CancellationToken,
    role: ControllerRole,
    index: DeviceIndex,
    host: Arc<dyn DriverHost>,
    interval: Duration,
) {
    info!("Pose updates started for {} controller {}", role, index);
    let mut submitted: u64 = 0;

    while !token.is_cancelled() {
        let headset = host.headset_pose();
        let pose = synthesize_pose(&headset.device_to_absolute_tracking, role);
        host.tracked_device_pose_updated(index, &pose);
        submitted += 1;

        thread::sleep(interval);
    }

    info!(
        "Pose updates stopped for {} controller {} after {} submissions",
        role, index, submitted
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedHost;

    #[test]
    fn cancelled_token_submits_nothing() {
        let host = SimulatedHost::with_defaults();
        let index = DeviceIndex(1);
        let token = CancellationToken::new();
        token.cancel();

        let task = PoseUpdateTask::spawn(
            ControllerRole::LeftHand,
            index,
            host.clone(),
            Duration::from_millis(1),
            token,
        )
        .unwrap();
        task.stop();

        assert_eq!(host.pose_count(index), 0);
    }

    #[test]
    fn owner_cancellation_stops_the_loop_before_join() {
        let host = SimulatedHost::with_defaults();
        let index = DeviceIndex(2);
        let token = CancellationToken::new();
        let task = PoseUpdateTask::spawn(
            ControllerRole::RightHand,
            index,
            host.clone(),
            Duration::from_millis(1),
            token.clone(),
        )
        .unwrap();
        assert!(host.wait_for_poses(index, 2, Duration::from_secs(1)));

        token.cancel();
        thread::sleep(Duration::from_millis(10));
        let settled = host.pose_count(index);
        thread::sleep(Duration::from_millis(10));

        assert_eq!(host.pose_count(index), settled);
        task.stop();
        assert_eq!(host.pose_count(index), settled);
    }
}
