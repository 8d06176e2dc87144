//! Pulse-width thresholds for the Lighthouse optical protocol, in capture timer ticks.
//!
//! Base stations run their rotors at 60 Hz, so a half rotation (180°) takes 8333 µs and the
//! laser crosses the station's optical axis 4000 µs after the sync flash. Sync flashes encode
//! three bits in their width; sweeps are a few microseconds wide.
//!
//! ```
//! use lighthouse_tracker::PulseTiming;
//!
//! const TIMING: PulseTiming = PulseTiming::new(48);
//! let code = TIMING.classify_sync(104 * 48).unwrap();
//! assert!(code.skip);
//! assert_eq!((code.axis, code.data), (0, 0));
//! assert_eq!(TIMING.classify_sync(67 * 48), None); // between two windows
//! ```

use core::f32::consts::PI;

use crate::shared_constants::TICKS_PER_MICROSECOND;

/// Sync flash widths in tenths of a microsecond, same order as [`SYNC_CODES`].
const SYNC_CENTERS_TENTHS_US: [u32; 8] = [625, 833, 729, 938, 1040, 1250, 1150, 1350];

/// The three bits a sync flash carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SyncCode {
    /// The rotor this flash announces will not sweep this cycle.
    pub skip: bool,
    /// Rotor axis, 0 or 1.
    pub axis: u8,
    /// One bit of the OOTX stream, 0 or 1.
    pub data: u8,
}

const fn code(skip: bool, axis: u8, data: u8) -> SyncCode {
    SyncCode { skip, axis, data }
}

/// Bit patterns in `skip, axis, data` order.
const SYNC_CODES: [SyncCode; 8] = [
    code(false, 0, 0),
    code(false, 0, 1),
    code(false, 1, 0),
    code(false, 1, 1),
    code(true, 0, 0),
    code(true, 0, 1),
    code(true, 1, 0),
    code(true, 1, 1),
];

impl SyncCode {
    /// Conventional short name (`j0`..`k3`) for traces.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match (self.skip, self.axis, self.data) {
            (false, 0, 0) => "j0",
            (false, 0, _) => "j1",
            (false, _, 0) => "k0",
            (false, _, _) => "k1",
            (true, 0, 0) => "j2",
            (true, 0, _) => "j3",
            (true, _, 0) => "k2",
            (true, _, _) => "k3",
        }
    }
}

/// Tenths of a microsecond to ticks, truncating.
const fn tenths_to_ticks(tenths_us: u32, ticks_per_us: u32) -> u32 {
    tenths_us.saturating_mul(ticks_per_us).wrapping_div(10)
}

/// Every threshold the pulse classifier uses, converted to timer ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PulseTiming {
    pub ticks_per_us: u32,
    /// Pulses narrower than this are laser sweeps.
    pub sweep_max_width: u32,
    /// Sweeps later than this after the sync reference are stale.
    pub sweep_window: u32,
    /// Sweep offset corresponding to an angle of zero.
    pub sweep_center: u32,
    /// Ticks per half rotation (π radians).
    pub half_rotation: u32,
    /// Gap between rising edges that ends a sync sequence.
    pub long_gap: u32,
    /// Accepted deviation from a sync center, each side.
    pub sync_tolerance: u32,
    pub sync_centers: [u32; 8],
}

impl PulseTiming {
    /// Timing for the tick rate this crate was built with (`LIGHTHOUSE_TICKS_PER_US`).
    pub const DEFAULT: Self = Self::new(TICKS_PER_MICROSECOND);

    #[must_use]
    pub const fn new(ticks_per_us: u32) -> Self {
        let [j0, j1, k0, k1, j2, j3, k2, k3] = SYNC_CENTERS_TENTHS_US;
        Self {
            ticks_per_us,
            sweep_max_width: ticks_per_us.saturating_mul(15),
            sweep_window: ticks_per_us.saturating_mul(8_000),
            sweep_center: ticks_per_us.saturating_mul(4_000),
            half_rotation: ticks_per_us.saturating_mul(8_333),
            long_gap: ticks_per_us.saturating_mul(800),
            sync_tolerance: ticks_per_us.saturating_mul(4),
            sync_centers: [
                tenths_to_ticks(j0, ticks_per_us),
                tenths_to_ticks(j1, ticks_per_us),
                tenths_to_ticks(k0, ticks_per_us),
                tenths_to_ticks(k1, ticks_per_us),
                tenths_to_ticks(j2, ticks_per_us),
                tenths_to_ticks(j3, ticks_per_us),
                tenths_to_ticks(k2, ticks_per_us),
                tenths_to_ticks(k3, ticks_per_us),
            ],
        }
    }

    /// Decode a sync flash width; `None` when it falls outside every window.
    #[must_use]
    pub fn classify_sync(&self, width: u32) -> Option<SyncCode> {
        self.sync_centers
            .iter()
            .zip(SYNC_CODES)
            .find_map(|(&center, candidate)| {
                (width >= center.saturating_sub(self.sync_tolerance)
                    && width <= center.saturating_add(self.sync_tolerance))
                .then_some(candidate)
            })
    }

    /// Rotor angle in radians for a sweep seen `delta` ticks after the sync reference.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "tick counts stay well below 2^24")]
    pub fn angle(&self, delta: u32) -> f32 {
        (delta as f32 - self.sweep_center as f32) * PI / self.half_rotation as f32
    }

    /// Whole microseconds in a tick count, for traces.
    #[must_use]
    pub fn to_micros(&self, ticks: u32) -> u32 {
        ticks.checked_div(self.ticks_per_us).unwrap_or(0)
    }
}

impl Default for PulseTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}
