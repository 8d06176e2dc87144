//! Pulse classification for one photodiode sensor.
//!
//! Each base station cycle is a pair of sync flashes (one per station, in either order)
//! followed by one laser sweep. The sync flash of the station that is *not* skipping its
//! sweep starts the angle clock; the sweep's arrival time on that clock is the angle.
//!
//! The sensor's two edges are captured on separate channels. The falling edge starts a
//! pulse and the rising edge ends it, so each rising edge yields one pulse observation.
//!
//! See [`LighthouseSensor`] for the polled form and [`PulseClassifier`] for the state
//! machine on its own.

use core::fmt::{self, Write};

use crate::capture::{CaptureRead, EdgeCapture};
use crate::ootx::{OotxDecoder, OotxFrame};
use crate::shared_constants::SLOT_COUNT;
use crate::timing::{PulseTiming, SyncCode};

// ===== Public API ===========================================================

/// Which of the two base stations a sweep came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Station {
    /// Its non-skip sync flash follows the other station's skip flash. Carries OOTX data.
    A,
    /// Its skip flash follows the other station's non-skip flash.
    B,
}

impl Station {
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Angle slot for this station's sweep on `axis`.
    #[must_use]
    pub const fn slot(self, axis: u8) -> usize {
        match (self, axis) {
            (Self::A, 0) => 0,
            (Self::A, _) => 1,
            (Self::B, 0) => 2,
            (Self::B, _) => 3,
        }
    }
}

/// A new angle for one of the [`SLOT_COUNT`] slots (`station * 2 + axis`).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub slot: usize,
    pub angle: f32,
}

/// A laser sweep pulse.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SweepPulse {
    pub timestamp: u32,
    pub width: u32,
    /// Ticks from the sync reference to the middle of the sweep.
    pub delta: u32,
    pub station: Option<Station>,
    pub axis: u8,
    /// Set only when the sweep was accepted.
    pub measurement: Option<Measurement>,
}

/// A sync flash whose width matched one of the eight encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncPulse {
    pub timestamp: u32,
    pub width: u32,
    pub code: SyncCode,
    /// Station identified once this flash was applied.
    pub station: Option<Station>,
    /// This flash's data bit completed an OOTX frame.
    pub ootx_complete: bool,
}

/// What one poll observed.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulseEvent {
    /// No rising edge was waiting.
    Idle,
    /// The rising-edge channel overran; the edge at `timestamp` was discarded.
    SampleLoss { timestamp: u32 },
    Sweep(SweepPulse),
    Sync(SyncPulse),
    /// A pulse too wide for a sweep that matched no sync encoding.
    Unclassified { timestamp: u32, width: u32 },
}

impl PulseEvent {
    /// The angle this event contributes, if any.
    #[must_use]
    pub const fn measurement(&self) -> Option<Measurement> {
        match self {
            Self::Sweep(sweep) => sweep.measurement,
            _ => None,
        }
    }

    /// Write one comma-separated trace line (no newline) for offline analysis.
    ///
    /// Sweeps: `timestamp,sensor,S,station,axis,delta,valid,width_us`.
    /// Syncs: `timestamp,sensor,X,name,skip,axis,data,width_us`, with `??,9,9,9` when the
    /// width matched no encoding. Unknown stations print as `9`.
    ///
    /// # Errors
    /// Propagates errors from the writer.
    pub fn write_csv<W: Write>(&self, out: &mut W, sensor: u8, timing: &PulseTiming) -> fmt::Result {
        match self {
            Self::Idle => Ok(()),
            Self::SampleLoss { timestamp } => write!(out, "{timestamp},{sensor},L"),
            Self::Sweep(sweep) => write!(
                out,
                "{},{},S,{},{},{},{},{}",
                sweep.timestamp,
                sensor,
                sweep.station.map_or(9, Station::index),
                sweep.axis,
                sweep.delta,
                u8::from(sweep.measurement.is_some()),
                timing.to_micros(sweep.width),
            ),
            Self::Sync(sync) => write!(
                out,
                "{},{},X,{},{},{},{},{}",
                sync.timestamp,
                sensor,
                sync.code.name(),
                u8::from(sync.code.skip),
                sync.code.axis,
                sync.code.data,
                timing.to_micros(sync.width),
            ),
            Self::Unclassified { timestamp, width } => write!(
                out,
                "{},{},X,??,9,9,9,{}",
                timestamp,
                sensor,
                timing.to_micros(*width),
            ),
        }
    }
}

// ===== Classifier ===========================================================

/// One pulse, measured at its rising edge.
#[derive(Clone, Copy, Debug)]
struct PulseObservation {
    timestamp: u32,
    /// Rising edge minus the last falling edge.
    width: u32,
    /// Rising edge minus the previous rising edge.
    duty: u32,
}

#[derive(Clone, Copy, Debug, Default)]
struct CycleState {
    last_rising: u32,
    last_falling: u32,
    /// Falling edge of the non-skip sync flash: the angle clock's origin.
    zero_time: u32,
    axis: u8,
    station: Option<Station>,
    got_sweep: bool,
    got_skip: bool,
    got_not_skip: bool,
}

impl CycleState {
    fn start_cycle(&mut self) {
        self.station = None;
        self.got_sweep = false;
        self.got_skip = false;
        self.got_not_skip = false;
    }
}

/// Sweep/sync state machine for one sensor, fed with edge timestamps.
#[derive(Debug)]
pub struct PulseClassifier {
    timing: PulseTiming,
    state: CycleState,
    raw: [u32; SLOT_COUNT],
    angles: [f32; SLOT_COUNT],
    ootx: OotxDecoder,
}

impl PulseClassifier {
    #[must_use]
    pub const fn new(timing: PulseTiming) -> Self {
        Self {
            timing,
            state: CycleState {
                last_rising: 0,
                last_falling: 0,
                zero_time: 0,
                axis: 0,
                station: None,
                got_sweep: false,
                got_skip: false,
                got_not_skip: false,
            },
            raw: [0; SLOT_COUNT],
            angles: [0.0; SLOT_COUNT],
            ootx: OotxDecoder::new(),
        }
    }

    /// Record the start of a pulse.
    pub fn falling_edge(&mut self, timestamp: u32) {
        self.state.last_falling = timestamp;
    }

    /// Classify the pulse that ends at this rising edge.
    pub fn rising_edge(&mut self, timestamp: u32) -> PulseEvent {
        let pulse = PulseObservation {
            timestamp,
            width: timestamp.wrapping_sub(self.state.last_falling),
            duty: timestamp.wrapping_sub(self.state.last_rising),
        };
        self.state.last_rising = timestamp;

        if pulse.width < self.timing.sweep_max_width {
            return PulseEvent::Sweep(self.sweep_pulse(pulse));
        }

        // First sync after a sweep, or the sync sequence went quiet: start over.
        if self.state.got_sweep || pulse.duty > self.timing.long_gap {
            self.state.start_cycle();
        }

        let Some(code) = self.timing.classify_sync(pulse.width) else {
            log_trace!("sensor: unclassified width {}", pulse.width);
            return PulseEvent::Unclassified {
                timestamp,
                width: pulse.width,
            };
        };

        let mut ootx_complete = false;
        if code.skip {
            self.state.got_skip = true;
            if self.state.got_not_skip {
                self.state.station = Some(Station::B);
            }
        } else {
            self.state.zero_time = self.state.last_falling;
            self.state.axis = code.axis;
            self.state.got_not_skip = true;
            if self.state.got_skip {
                self.state.station = Some(Station::A);
                ootx_complete = self.ootx.add(code.data);
            }
        }

        PulseEvent::Sync(SyncPulse {
            timestamp,
            width: pulse.width,
            code,
            station: self.state.station,
            ootx_complete,
        })
    }

    fn sweep_pulse(&mut self, pulse: PulseObservation) -> SweepPulse {
        // The middle of the pulse is when the laser crossed the sensor.
        let midpoint = pulse.timestamp.wrapping_sub(pulse.width.wrapping_div(2));
        let delta = midpoint.wrapping_sub(self.state.zero_time);
        let station = self.state.station;
        let axis = self.state.axis;
        let valid = !self.state.got_sweep && delta < self.timing.sweep_window;

        // One sweep per cycle, even a rejected one.
        self.state.got_sweep = true;
        self.state.got_skip = false;
        self.state.got_not_skip = false;
        self.state.station = None;

        let measurement = station.filter(|_| valid).and_then(|station| {
            let slot = station.slot(axis);
            let angle = self.timing.angle(delta);
            *self.raw.get_mut(slot)? = delta;
            *self.angles.get_mut(slot)? = angle;
            Some(Measurement { slot, angle })
        });

        SweepPulse {
            timestamp: pulse.timestamp,
            width: pulse.width,
            delta,
            station,
            axis,
            measurement,
        }
    }

    /// Latest accepted angles, radians, by slot.
    #[must_use]
    pub const fn angles(&self) -> &[f32; SLOT_COUNT] {
        &self.angles
    }

    /// Latest accepted sweep offsets, ticks, by slot.
    #[must_use]
    pub const fn raw(&self) -> &[u32; SLOT_COUNT] {
        &self.raw
    }

    #[must_use]
    pub const fn timing(&self) -> &PulseTiming {
        &self.timing
    }

    /// Station identified in the current cycle, if any.
    #[must_use]
    pub const fn station(&self) -> Option<Station> {
        self.state.station
    }

    #[must_use]
    pub const fn ootx(&self) -> &OotxDecoder {
        &self.ootx
    }

    pub fn take_ootx_frame(&mut self) -> Option<OotxFrame> {
        self.ootx.take_frame()
    }
}

// ===== Sensor ===============================================================

/// A photodiode sensor wired to two capture channels, one per edge.
#[derive(Debug)]
pub struct LighthouseSensor<'a> {
    id: u8,
    rising: EdgeCapture<'a>,
    falling: EdgeCapture<'a>,
    classifier: PulseClassifier,
}

impl<'a> LighthouseSensor<'a> {
    #[must_use]
    pub const fn new(
        id: u8,
        rising: EdgeCapture<'a>,
        falling: EdgeCapture<'a>,
        timing: PulseTiming,
    ) -> Self {
        Self {
            id,
            rising,
            falling,
            classifier: PulseClassifier::new(timing),
        }
    }

    /// Drain at most one edge from each channel and classify the resulting pulse.
    ///
    /// A waiting falling edge is always applied first so the rising edge read in the same
    /// call is measured against it.
    pub fn poll(&mut self) -> PulseEvent {
        if let Some(timestamp) = self.falling.read().timestamp() {
            self.classifier.falling_edge(timestamp);
        }

        match self.rising.read() {
            CaptureRead::NoData => PulseEvent::Idle,
            CaptureRead::SampleWithLoss(timestamp) => {
                log_warn!("sensor {}: rising edges lost", self.id);
                PulseEvent::SampleLoss { timestamp }
            }
            CaptureRead::Sample(timestamp) => self.classifier.rising_edge(timestamp),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u8 {
        self.id
    }

    #[must_use]
    pub const fn classifier(&self) -> &PulseClassifier {
        &self.classifier
    }

    pub fn take_ootx_frame(&mut self) -> Option<OotxFrame> {
        self.classifier.take_ootx_frame()
    }
}
