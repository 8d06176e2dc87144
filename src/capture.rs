//! Edge-triggered input capture on a free-running 16-bit timer.
//!
//! The timer counts over a 65536-tick modulus and raises one shared interrupt for both
//! counter overflow and channel captures. [`CaptureRegistry::on_interrupt`] is that
//! interrupt's single entry point: it extends each captured 16-bit value into a 32-bit
//! [`EdgeBuffer`] timestamp using the [`OverflowClock`], and pushes it into the buffer of
//! whichever channel claimed it.
//!
//! Board crates implement [`CaptureTimer`] over their timer registers and keep the
//! registry in a `critical_section::Mutex` so the interrupt handler can reach it:
//!
//! ```rust,ignore
//! static CLOCK: OverflowClock = OverflowClock::new();
//! static RISING: EdgeBuffer = EdgeBuffer::new();
//! static REGISTRY: Mutex<RefCell<CaptureRegistry<'static>>> =
//!     Mutex::new(RefCell::new(CaptureRegistry::new(&CLOCK)));
//!
//! #[interrupt]
//! fn FTM0() {
//!     critical_section::with(|cs| REGISTRY.borrow_ref(cs).on_interrupt(&mut board_timer()));
//! }
//! ```

use portable_atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};

use crate::shared_constants::{CHANNEL_COUNT, HIGH_WATER, SAMPLE_COUNT};
use crate::{Error, Result};

// ===== Public API ===========================================================

/// A timer channel able to capture edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureChannel {
    Ch0,
    Ch1,
    Ch2,
    Ch3,
    Ch4,
    Ch5,
    Ch6,
    Ch7,
}

impl CaptureChannel {
    /// Every channel, in hardware order.
    pub const ALL: [Self; CHANNEL_COUNT] = [
        Self::Ch0,
        Self::Ch1,
        Self::Ch2,
        Self::Ch3,
        Self::Ch4,
        Self::Ch5,
        Self::Ch6,
        Self::Ch7,
    ];

    /// Raw hardware channel number.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    const fn mask(self) -> u8 {
        1u8.wrapping_shl(self as u32)
    }
}

/// Which edge a channel captures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    Rising,
    Falling,
}

/// Outcome of a non-blocking [`EdgeCapture::read`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CaptureRead {
    /// Nothing captured since the last read.
    NoData,
    /// The next timestamp, in order.
    Sample(u32),
    /// The consumer fell more than [`SAMPLE_COUNT`] samples behind. Older samples were
    /// dropped; this is the oldest one kept and delivery continues normally after it.
    SampleWithLoss(u32),
}

impl CaptureRead {
    /// The timestamp carried by this read, lossy or not.
    #[must_use]
    pub const fn timestamp(self) -> Option<u32> {
        match self {
            Self::NoData => None,
            Self::Sample(timestamp) | Self::SampleWithLoss(timestamp) => Some(timestamp),
        }
    }
}

/// Register-level access to the shared capture timer, implemented per board.
///
/// All methods are called from the timer interrupt except [`CaptureTimer::configure`],
/// which runs once per channel at setup.
pub trait CaptureTimer {
    /// Route the channel's pin to the timer and capture on the given edge.
    fn configure(&mut self, channel: CaptureChannel, polarity: Polarity);

    /// Return and acknowledge a pending counter overflow.
    fn take_overflow(&mut self) -> bool;

    /// Return and acknowledge a pending capture on the channel.
    fn take_capture(&mut self, channel: CaptureChannel) -> Option<u16>;
}

/// Extend a captured 16-bit counter value to 32 bits.
///
/// When the overflow and the capture are serviced by the same interrupt, a captured value
/// near the top of the range was latched before the wrap, so it belongs to the previous
/// overflow window.
#[must_use]
pub fn reconstruct(low: u16, overflow_count: u16, overflow_in_progress: bool) -> u32 {
    let high = if overflow_in_progress && low >= HIGH_WATER {
        overflow_count.wrapping_sub(1)
    } else {
        overflow_count
    };
    u32::from(high).wrapping_shl(16) | u32::from(low)
}

// ===== Overflow clock =======================================================

/// The high half of every timestamp: a count of timer wraps, shared by all channels.
#[derive(Debug)]
pub struct OverflowClock {
    count: AtomicU16,
    in_progress: AtomicBool,
}

impl OverflowClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: AtomicU16::new(0),
            in_progress: AtomicBool::new(false),
        }
    }

    /// Record a wrap. Stays "in progress" until [`OverflowClock::end_overflow`].
    pub fn begin_overflow(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.in_progress.store(true, Ordering::Release);
    }

    pub fn end_overflow(&self) {
        self.in_progress.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn overflow_count(&self) -> u16 {
        self.count.load(Ordering::Acquire)
    }

    /// Timestamp for a value captured during the current interrupt.
    #[must_use]
    pub fn timestamp(&self, low: u16) -> u32 {
        reconstruct(
            low,
            self.overflow_count(),
            self.in_progress.load(Ordering::Acquire),
        )
    }
}

impl Default for OverflowClock {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Edge buffer ==========================================================

/// Single-producer/single-consumer ring of edge timestamps for one channel.
///
/// The timer interrupt is the only writer of `write_index` and never waits. The consumer
/// reads `write_index` and advances `read_index` inside a critical section, so the
/// producer cannot overwrite the slot being read.
#[derive(Debug)]
pub struct EdgeBuffer {
    samples: [AtomicU32; SAMPLE_COUNT],
    write_index: AtomicU32,
    read_index: AtomicU32,
}

impl EdgeBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            samples: [const { AtomicU32::new(0) }; SAMPLE_COUNT],
            write_index: AtomicU32::new(0),
            read_index: AtomicU32::new(0),
        }
    }

    /// Append a timestamp. Interrupt context only.
    pub fn push(&self, timestamp: u32) {
        let write_index = self.write_index.load(Ordering::Relaxed);
        if let Some(slot) = self.samples.get(slot_of(write_index)) {
            slot.store(timestamp, Ordering::Relaxed);
        }
        self.write_index
            .store(write_index.wrapping_add(1), Ordering::Release);
    }

    /// Take the next timestamp without blocking. Poll context only.
    pub fn read(&self) -> CaptureRead {
        critical_section::with(|_cs| {
            let write_index = self.write_index.load(Ordering::Acquire);
            let mut read_index = self.read_index.load(Ordering::Relaxed);
            if write_index == read_index {
                return CaptureRead::NoData;
            }

            // Indices wrap at 2^32, which is a multiple of the capacity.
            let lost = write_index.wrapping_sub(read_index) > CAPACITY;
            if lost {
                read_index = write_index.wrapping_sub(INDEX_MASK);
            }

            let timestamp = self
                .samples
                .get(slot_of(read_index))
                .map_or(0, |slot| slot.load(Ordering::Relaxed));
            self.read_index
                .store(read_index.wrapping_add(1), Ordering::Relaxed);

            if lost {
                CaptureRead::SampleWithLoss(timestamp)
            } else {
                CaptureRead::Sample(timestamp)
            }
        })
    }

    /// Unread samples, saturating at more than the capacity when samples were lost.
    #[must_use]
    pub fn pending(&self) -> u32 {
        critical_section::with(|_cs| {
            self.write_index
                .load(Ordering::Acquire)
                .wrapping_sub(self.read_index.load(Ordering::Relaxed))
        })
    }

    fn reset(&self) {
        critical_section::with(|_cs| {
            self.write_index.store(0, Ordering::Release);
            self.read_index.store(0, Ordering::Relaxed);
        });
    }
}

impl Default for EdgeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[expect(clippy::cast_possible_truncation, reason = "SAMPLE_COUNT is 64")]
const CAPACITY: u32 = SAMPLE_COUNT as u32;

const INDEX_MASK: u32 = CAPACITY.wrapping_sub(1);

const _: () = assert!(CAPACITY.is_power_of_two(), "SAMPLE_COUNT must be a power of two");

const fn slot_of(index: u32) -> usize {
    (index & INDEX_MASK) as usize
}

// ===== Registry =============================================================

/// Bounded table of claimed channels, keyed by [`CaptureChannel`].
///
/// Populated at setup time, then read by the timer interrupt through
/// [`CaptureRegistry::on_interrupt`].
#[derive(Debug)]
pub struct CaptureRegistry<'a> {
    clock: &'a OverflowClock,
    handlers: [Option<&'a EdgeBuffer>; CHANNEL_COUNT],
    claimed: u8,
}

impl<'a> CaptureRegistry<'a> {
    #[must_use]
    pub const fn new(clock: &'a OverflowClock) -> Self {
        Self {
            clock,
            handlers: [None; CHANNEL_COUNT],
            claimed: 0,
        }
    }

    /// Claim a channel, configure it on the timer, and return the consumer handle.
    ///
    /// # Errors
    /// Returns [`Error::ChannelClaimed`] if another capture already owns the channel, or
    /// [`Error::BufferClaimed`] if `buffer` is already fed by another channel. The existing
    /// claim is left untouched in both cases.
    pub fn claim<T: CaptureTimer>(
        &mut self,
        timer: &mut T,
        channel: CaptureChannel,
        polarity: Polarity,
        buffer: &'a EdgeBuffer,
    ) -> Result<EdgeCapture<'a>> {
        if self.is_claimed(channel) {
            log_warn!("capture: channel {} already claimed", channel.index());
            return Err(Error::ChannelClaimed(channel));
        }
        if let Some(owner) = self.owner_of(buffer) {
            log_warn!(
                "capture: buffer already fed by channel {}",
                owner.index()
            );
            return Err(Error::BufferClaimed(owner));
        }

        buffer.reset();
        let handler = self
            .handlers
            .get_mut(channel.index())
            .ok_or(Error::ChannelClaimed(channel))?;
        *handler = Some(buffer);
        self.claimed |= channel.mask();
        timer.configure(channel, polarity);
        log_debug!("capture: claimed channel {}", channel.index());

        Ok(EdgeCapture {
            buffer,
            channel,
            polarity,
        })
    }

    /// The channel whose captures already go to `buffer`, if any.
    fn owner_of(&self, buffer: &EdgeBuffer) -> Option<CaptureChannel> {
        CaptureChannel::ALL
            .into_iter()
            .zip(self.handlers)
            .find_map(|(channel, handler)| {
                handler
                    .filter(|&registered| core::ptr::eq(registered, buffer))
                    .map(|_| channel)
            })
    }

    #[must_use]
    pub const fn is_claimed(&self, channel: CaptureChannel) -> bool {
        self.claimed & channel.mask() != 0
    }

    #[must_use]
    pub const fn clock(&self) -> &'a OverflowClock {
        self.clock
    }

    /// Service the shared timer interrupt.
    ///
    /// An overflow is counted first and stays flagged as in progress while every claimed
    /// channel's pending capture is timestamped, so captures latched just before the wrap
    /// keep the previous overflow count.
    pub fn on_interrupt<T: CaptureTimer>(&self, timer: &mut T) {
        if timer.take_overflow() {
            self.clock.begin_overflow();
        }

        for (channel, handler) in CaptureChannel::ALL.into_iter().zip(self.handlers) {
            let Some(buffer) = handler else {
                continue;
            };
            if let Some(low) = timer.take_capture(channel) {
                buffer.push(self.clock.timestamp(low));
            }
        }

        self.clock.end_overflow();
    }
}

/// Consumer side of a claimed channel.
#[derive(Clone, Copy, Debug)]
pub struct EdgeCapture<'a> {
    buffer: &'a EdgeBuffer,
    channel: CaptureChannel,
    polarity: Polarity,
}

impl EdgeCapture<'_> {
    /// Take the next captured timestamp without blocking.
    ///
    /// See [`CaptureRead`] for how sample loss is reported.
    pub fn read(&self) -> CaptureRead {
        self.buffer.read()
    }

    #[must_use]
    pub const fn channel(&self) -> CaptureChannel {
        self.channel
    }

    #[must_use]
    pub const fn polarity(&self) -> Polarity {
        self.polarity
    }
}
