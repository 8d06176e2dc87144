//! One sensor's path from captured edges to positions and OOTX frames.

use crate::geometry::{Fix, PositionSolver};
use crate::ootx::OotxFrame;
use crate::sensor::{LighthouseSensor, PulseEvent};

/// Something a [`SensorPipeline`] produced for its consumer.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    /// The sensor's four angles were refreshed and triangulated.
    Position { sensor: u8, fix: Fix },
    /// Station A finished broadcasting an OOTX frame.
    OotxFrame { sensor: u8, frame: OotxFrame },
}

/// A [`LighthouseSensor`] feeding its accepted angles into a [`PositionSolver`].
#[derive(Debug)]
pub struct SensorPipeline<'a> {
    sensor: LighthouseSensor<'a>,
    solver: PositionSolver,
}

impl<'a> SensorPipeline<'a> {
    #[must_use]
    pub const fn new(sensor: LighthouseSensor<'a>, solver: PositionSolver) -> Self {
        Self { sensor, solver }
    }

    /// Process at most one pulse; returns what it produced, if anything.
    ///
    /// The [`PulseEvent`] is handed to `trace` first so callers can log or record it.
    pub fn poll_with(&mut self, trace: impl FnOnce(&PulseEvent)) -> Option<TrackerEvent> {
        let event = self.sensor.poll();
        trace(&event);

        match event {
            PulseEvent::Sync(sync) if sync.ootx_complete => {
                let frame = self.sensor.take_ootx_frame()?;
                log_debug!("sensor {}: OOTX frame, {} bytes", self.sensor.id(), frame.len());
                Some(TrackerEvent::OotxFrame {
                    sensor: self.sensor.id(),
                    frame,
                })
            }
            _ => {
                let measurement = event.measurement()?;
                if !self.solver.update(measurement.slot, measurement.angle) {
                    return None;
                }
                let fix = self.solver.fix()?;
                log_trace!(
                    "sensor {}: fix {} {} {} dist {}",
                    self.sensor.id(),
                    fix.position[0],
                    fix.position[1],
                    fix.position[2],
                    fix.distance
                );
                Some(TrackerEvent::Position {
                    sensor: self.sensor.id(),
                    fix,
                })
            }
        }
    }

    /// Process at most one pulse.
    pub fn poll(&mut self) -> Option<TrackerEvent> {
        self.poll_with(|_| {})
    }

    #[must_use]
    pub const fn sensor(&self) -> &LighthouseSensor<'a> {
        &self.sensor
    }

    #[must_use]
    pub const fn solver(&self) -> &PositionSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut PositionSolver {
        &mut self.solver
    }
}
