//! Bit-serial accumulator used to frame the OOTX stream.

/// Most recent bits received, newest in the least significant position.
///
/// Holds at most 32 bits; callers frame words well below that.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShiftRegister {
    value: u32,
    len: u8,
}

impl ShiftRegister {
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0, len: 0 }
    }

    /// Shift one bit in and return how many bits are now held.
    pub fn push_bit(&mut self, bit: bool) -> u8 {
        self.value = self.value.wrapping_shl(1) | u32::from(bit);
        self.len = self.len.saturating_add(1).min(32);
        self.len
    }

    /// Forget the oldest held bit.
    pub fn drop_oldest(&mut self) {
        self.len = self.len.saturating_sub(1);
        self.value &= low_mask(self.len);
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub const fn value(&self) -> u32 {
        self.value
    }

    #[must_use]
    pub const fn len(&self) -> u8 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn low_mask(bits: u8) -> u32 {
    1u32.checked_shl(u32::from(bits))
        .map_or(u32::MAX, |bit| bit.wrapping_sub(1))
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn newest_bit_is_least_significant() {
        let mut shift = ShiftRegister::new();
        for bit in [true, false, true, true] {
            shift.push_bit(bit);
        }
        assert_eq!(shift.len(), 4);
        assert_eq!(shift.value(), 0b1011);
    }

    #[test]
    fn drop_oldest_keeps_the_newest_bits() {
        let mut shift = ShiftRegister::new();
        for bit in [true, true, false, true] {
            shift.push_bit(bit);
        }
        shift.drop_oldest();
        assert_eq!(shift.len(), 3);
        assert_eq!(shift.value(), 0b101);

        shift.clear();
        assert!(shift.is_empty());
        assert_eq!(shift.value(), 0);
    }
}
