//! Decode HTC Vive Lighthouse base station signals and triangulate sensor positions.
//!
//! Photodiode edges are timestamped by a shared capture timer ([`capture`]), classified
//! into sync flashes and laser sweeps per sensor ([`sensor`]), and turned into positions
//! ([`geometry`]) and OOTX configuration frames ([`ootx`]).
#![no_std]

#[macro_use]
mod log;

pub mod calibration;
pub mod capture;
pub mod capture_mock;
mod error;
pub mod geometry;
pub mod ootx;
pub mod pipeline;
pub mod sensor;
mod shared_constants;
mod shift_register;
pub mod timing;
#[cfg(feature = "embassy")]
pub mod tracker;

// Re-export commonly used items
pub use calibration::Calibration;
pub use capture::{
    CaptureChannel, CaptureRead, CaptureRegistry, CaptureTimer, EdgeBuffer, EdgeCapture,
    OverflowClock, Polarity,
};
pub use error::{Error, Result};
pub use geometry::{Fix, LightSource, PositionSolver};
pub use ootx::{OotxDecoder, OotxFrame};
pub use pipeline::{SensorPipeline, TrackerEvent};
pub use sensor::{
    LighthouseSensor, Measurement, PulseClassifier, PulseEvent, Station, SweepPulse, SyncPulse,
};
pub use shared_constants::*;
pub use shift_register::ShiftRegister;
pub use timing::{PulseTiming, SyncCode};
#[cfg(feature = "embassy")]
pub use tracker::{Tracker, TrackerStatic};
