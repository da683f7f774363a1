use color_eyre::{eyre::eyre, Result};
use glam::{EulerRot, Quat, Vec3};
use simplecontroller::config::SettingsStore;
use simplecontroller::device::InputComponent;
use simplecontroller::host::{
    DeviceIndex, HapticVibration, HmdMatrix34, PropertyContainerHandle, VrEvent,
};
use simplecontroller::sim::SimulatedHost;
use simplecontroller::{hmd_driver_factory, SERVER_TRACKED_DEVICE_PROVIDER_VERSION};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const FRAME_INTERVAL: Duration = Duration::from_millis(11);
const HEADSET_INTERVAL: Duration = Duration::from_millis(20);
const HAPTIC_EVERY_FRAMES: u64 = 90;
const REPORT_EVERY_FRAMES: u64 = 270;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = SettingsStore::load_or_default()?;
    let host = SimulatedHost::new(settings);

    let mut provider = hmd_driver_factory(SERVER_TRACKED_DEVICE_PROVIDER_VERSION)?;
    if let Err(e) = provider.init(host.context()) {
        error!(
            "Driver init failed with code {}: {}",
            e.init_error().code(),
            e
        );
        host.release_drivers();
        return Err(eyre!("Driver init failed: {}", e));
    }

    for (index, result) in host.activate_registered() {
        if let Err(e) = result {
            warn!("Device {} did not activate: {}", index, e);
        }
    }

    let devices: Vec<DeviceIndex> = host.registered().iter().map(|device| device.index).collect();
    info!("Driving {} controllers", devices.len());

    let shutdown = CancellationToken::new();
    let headset_task = tokio::spawn(animate_headset(host.clone(), shutdown.clone()));

    let frame_limit = frame_limit();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    let mut frame: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                provider.run_frame();
                frame += 1;

                if frame % HAPTIC_EVERY_FRAMES == 0 && !devices.is_empty() {
                    let target = devices[(frame / HAPTIC_EVERY_FRAMES) as usize % devices.len()];
                    queue_haptic(&host, target);
                }

                if frame % REPORT_EVERY_FRAMES == 0 {
                    report_poses(&host);
                }

                if frame_limit.is_some_and(|limit| frame >= limit) {
                    info!("Reached {} frames", frame);
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    if let Err(e) = headset_task.await {
        warn!("Headset task ended abnormally: {}", e);
    }

    report_poses(&host);
    host.deactivate_registered();
    provider.cleanup();
    host.release_drivers();
    info!("Driver unloaded after {} frames", frame);

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

// SIMPLECONTROLLER_FRAMES limits the run; unset runs until ctrl-c
fn frame_limit() -> Option<u64> {
    let value = std::env::var("SIMPLECONTROLLER_FRAMES").ok()?;
    match value.parse() {
        Ok(limit) => Some(limit),
        Err(e) => {
            warn!("Ignoring SIMPLECONTROLLER_FRAMES={}: {}", value, e);
            None
        }
    }
}

/// Slowly turns the headset left and right while bobbing it up and down.
async fn animate_headset(host: Arc<SimulatedHost>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(HEADSET_INTERVAL);
    let mut t: f32 = 0.0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                t += HEADSET_INTERVAL.as_secs_f32();
                let yaw = (t * 0.5).sin() * std::f32::consts::FRAC_PI_4;
                let rotation = Quat::from_euler(EulerRot::YXZ, yaw, 0.0, 0.0);
                let position = Vec3::new(0.0, 1.7 + (t * 2.0).sin() * 0.02, 0.0);
                host.set_headset_pose(HmdMatrix34::from_rotation_translation(rotation, position));
            }
        }
    }
    debug!("Headset animation stopped");
}

fn queue_haptic(host: &SimulatedHost, index: DeviceIndex) {
    let Some(component) = host.component_handle(index, InputComponent::Haptic.path()) else {
        warn!("No haptic component for device {}", index);
        return;
    };

    debug!("Queueing haptic pulse for device {}", index);
    host.push_event(VrEvent::HapticVibration(HapticVibration {
        container: PropertyContainerHandle::INVALID,
        component,
        duration_seconds: 0.1,
        frequency: 160.0,
        amplitude: 0.8,
    }));
}

fn report_poses(host: &SimulatedHost) {
    for device in host.registered() {
        match host.last_pose(device.index) {
            Some(pose) => info!(
                "{} ({}) at {:?} after {} poses",
                device.serial_number,
                device.index,
                pose.position,
                host.pose_count(device.index)
            ),
            None => info!("{} ({}) has no pose yet", device.serial_number, device.index),
        }
    }
}
