//! Event routing from the host queue to the devices
//!
//! The router does not inspect events. Every event is offered once to every
//! device, and each device decides by handle comparison whether the event
//! was addressed to it.

use crate::device::{ControllerDriver, EventDisposition};
use crate::host::{DriverHost, VrEvent};
use std::sync::Arc;
use tracing::debug;

// Counters for one drain of the event queue
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoutedEvents {
    pub polled: usize,
    pub consumed: usize,
}

/// Offers `event` to every device; returns how many consumed it.
pub fn route_event(event: &VrEvent, devices: &[Arc<ControllerDriver>]) -> usize {
    devices
        .iter()
        .filter(|device| device.process_event(event) == EventDisposition::Consumed)
        .count()
}

/// Polls the host queue until it is empty, routing every event.
pub fn drain_events(host: &dyn DriverHost, devices: &[Arc<ControllerDriver>]) -> RoutedEvents {
    let mut routed = RoutedEvents::default();

    while let Some(event) = host.poll_next_event() {
        routed.polled += 1;
        let consumed = route_event(&event, devices);
        if consumed == 0 {
            debug!("No device consumed {:?}", event);
        }
        routed.consumed += consumed;
    }

    routed
}
