//! Mock capture timer for host tests and offline replay.

use crate::capture::{CaptureChannel, CaptureTimer, Polarity};
use crate::shared_constants::CHANNEL_COUNT;

/// Mock [`CaptureTimer`]
///
/// Holds the status flags a real timer would latch; tests set them with
/// [`MockCaptureTimer::latch`] and [`MockCaptureTimer::raise_overflow`], then run
/// [`CaptureRegistry::on_interrupt`](crate::capture::CaptureRegistry::on_interrupt).
#[derive(Debug, Default)]
pub struct MockCaptureTimer {
    overflow_pending: bool,
    captures: [Option<u16>; CHANNEL_COUNT],
    polarities: [Option<Polarity>; CHANNEL_COUNT],
}

impl MockCaptureTimer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            overflow_pending: false,
            captures: [None; CHANNEL_COUNT],
            polarities: [None; CHANNEL_COUNT],
        }
    }

    /// Latch a counter value on a channel, as an edge would.
    pub fn latch(&mut self, channel: CaptureChannel, low: u16) {
        if let Some(capture) = self.captures.get_mut(channel.index()) {
            *capture = Some(low);
        }
    }

    /// Flag a counter wrap.
    pub fn raise_overflow(&mut self) {
        self.overflow_pending = true;
    }

    #[must_use]
    pub fn is_pending(&self, channel: CaptureChannel) -> bool {
        self.captures
            .get(channel.index())
            .is_some_and(Option::is_some)
    }

    /// Edge the channel was configured for, if it was configured.
    #[must_use]
    pub fn polarity(&self, channel: CaptureChannel) -> Option<Polarity> {
        self.polarities.get(channel.index()).copied().flatten()
    }
}

impl CaptureTimer for MockCaptureTimer {
    fn configure(&mut self, channel: CaptureChannel, polarity: Polarity) {
        if let Some(slot) = self.polarities.get_mut(channel.index()) {
            *slot = Some(polarity);
        }
    }

    fn take_overflow(&mut self) -> bool {
        core::mem::take(&mut self.overflow_pending)
    }

    fn take_capture(&mut self, channel: CaptureChannel) -> Option<u16> {
        self.captures.get_mut(channel.index()).and_then(Option::take)
    }
}
