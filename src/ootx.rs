//! Decoder for the OOTX configuration stream carried by Lighthouse sync pulses.
//!
//! The base station sends one data bit per sync pulse. Frames look like:
//!
//! ```text
//! preamble     17 zeros then a 1
//! length word  16 bits (big endian) + sync bit 1
//! payload      ceil((length + 4) / 2) words of 16 bits + sync bit 1 each
//! ```
//!
//! The trailing 4 bytes are a CRC32 that is handed to the consumer but never checked.
//! Any framing violation drops the partial frame and goes back to hunting for a preamble.

use heapless::Vec;

use crate::shared_constants::OOTX_CAPACITY;
use crate::shift_register::ShiftRegister;

const PREAMBLE_BITS: u8 = 18;
const PREAMBLE: u32 = 0x1;
const WORD_BITS: u8 = 17;
const CRC_BYTES: usize = 4;

/// A complete OOTX frame: payload followed by its 4 CRC bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OotxFrame {
    bytes: Vec<u8, OOTX_CAPACITY>,
}

impl OotxFrame {
    /// Payload and CRC bytes, without the alignment padding byte.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes announced by the length word.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.bytes
            .get(..self.bytes.len().saturating_sub(CRC_BYTES))
            .unwrap_or_default()
    }

    /// The trailing CRC32 bytes as received. Not validated.
    #[must_use]
    pub fn crc_bytes(&self) -> &[u8] {
        self.bytes
            .get(self.bytes.len().saturating_sub(CRC_BYTES)..)
            .unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mode {
    Preamble,
    Length,
    Payload { length: usize, total: usize },
}

/// Bit-at-a-time OOTX frame decoder.
///
/// ```
/// use lighthouse_tracker::OotxDecoder;
///
/// let mut ootx = OotxDecoder::new();
/// let mut bits = [0u8; 17].to_vec();
/// bits.push(1); // preamble
/// for word in [0x0000u16, 0xDEAD, 0xBEEF] {
///     bits.extend((0..16).rev().map(|i| ((word >> i) & 1) as u8));
///     bits.push(1); // sync bit
/// }
/// let done = bits.into_iter().map(|bit| ootx.add(bit)).last();
/// assert_eq!(done, Some(true));
/// assert_eq!(ootx.frame().unwrap().crc_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
/// ```
#[derive(Debug)]
pub struct OotxDecoder {
    shift: ShiftRegister,
    mode: Mode,
    buffer: Vec<u8, OOTX_CAPACITY>,
    frame: Option<OotxFrame>,
}

impl OotxDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shift: ShiftRegister::new(),
            mode: Mode::Preamble,
            buffer: Vec::new(),
            frame: None,
        }
    }

    /// Feed one received bit. Returns `true` when this bit completed a frame.
    ///
    /// Values other than 0 and 1 are treated as line noise and reset the decoder.
    pub fn add(&mut self, bit: u8) -> bool {
        let bit = match bit {
            0 => false,
            1 => true,
            _ => {
                log_debug!("ootx: invalid bit {}", bit);
                self.reset();
                return false;
            }
        };

        let len = self.shift.push_bit(bit);

        if self.mode == Mode::Preamble {
            if len < PREAMBLE_BITS {
                return false;
            }
            if self.shift.value() == PREAMBLE {
                log_debug!("ootx: preamble");
                self.shift.clear();
                self.mode = Mode::Length;
            } else {
                // Slide the window: the next bit is checked against the newest 17.
                self.shift.drop_oldest();
            }
            return false;
        }

        if len < WORD_BITS {
            return false;
        }

        let raw = self.shift.value();
        self.shift.clear();
        if raw & 1 == 0 {
            log_debug!("ootx: missing sync bit");
            self.reset();
            return false;
        }

        let Ok(word) = u16::try_from(raw.wrapping_shr(1)) else {
            self.reset();
            return false;
        };
        self.add_word(word)
    }

    fn add_word(&mut self, word: u16) -> bool {
        match self.mode {
            Mode::Preamble => false,
            Mode::Length => {
                let length = usize::from(word).saturating_add(CRC_BYTES);
                let total = length.saturating_add(length & 1);
                if total > OOTX_CAPACITY {
                    log_warn!("ootx: length {} too long", length);
                    self.reset();
                    return false;
                }
                self.buffer.clear();
                self.mode = Mode::Payload { length, total };
                false
            }
            Mode::Payload { length, total } => {
                if self.buffer.extend_from_slice(&word.to_be_bytes()).is_err() {
                    self.reset();
                    return false;
                }
                if self.buffer.len() < total {
                    return false;
                }

                // The CRC32 is passed through unchecked.
                self.buffer.truncate(length);
                log_debug!("ootx: frame complete, {} bytes", length);
                self.frame = Some(OotxFrame {
                    bytes: core::mem::take(&mut self.buffer),
                });
                self.reset();
                true
            }
        }
    }

    fn reset(&mut self) {
        self.shift.clear();
        self.mode = Mode::Preamble;
        self.buffer.clear();
    }

    /// Whether a completed frame is waiting for the consumer.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.frame.is_some()
    }

    /// The most recent completed frame, if not yet taken.
    #[must_use]
    pub const fn frame(&self) -> Option<&OotxFrame> {
        self.frame.as_ref()
    }

    /// Hand the most recent completed frame to the consumer.
    pub fn take_frame(&mut self) -> Option<OotxFrame> {
        self.frame.take()
    }
}

impl Default for OotxDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
#[expect(clippy::arithmetic_side_effects, reason = "bit positions in test frames")]
mod tests {
    extern crate std;

    use super::*;
    use std::vec::Vec as StdVec;

    fn preamble(bits: &mut StdVec<u8>) {
        bits.extend([0u8; 17]);
        bits.push(1);
    }

    fn word(bits: &mut StdVec<u8>, word: u16, sync: u8) {
        bits.extend((0..16).rev().map(|i| u8::from((word >> i) & 1 == 1)));
        bits.push(sync);
    }

    fn encode(payload: &[u8], crc: [u8; 4]) -> StdVec<u8> {
        let mut bits = StdVec::new();
        preamble(&mut bits);
        word(&mut bits, u16::try_from(payload.len()).unwrap(), 1);
        let mut bytes: StdVec<u8> = payload.iter().copied().chain(crc).collect();
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        for pair in bytes.chunks(2) {
            word(&mut bits, u16::from_be_bytes([pair[0], pair[1]]), 1);
        }
        bits
    }

    fn feed(ootx: &mut OotxDecoder, bits: &[u8]) -> usize {
        bits.iter().filter(|&&bit| ootx.add(bit)).count()
    }

    #[test]
    fn decodes_frame_with_padding() {
        let payload = [0x10, 0x20, 0x30, 0x40, 0x50];
        let bits = encode(&payload, [1, 2, 3, 4]);
        let mut ootx = OotxDecoder::new();

        assert_eq!(feed(&mut ootx, &bits), 1);
        assert!(ootx.is_complete());
        let frame = ootx.take_frame().unwrap();
        assert_eq!(frame.len(), payload.len() + 4);
        assert_eq!(frame.payload(), &payload);
        assert_eq!(frame.crc_bytes(), &[1, 2, 3, 4]);
        assert!(!ootx.is_complete());
    }

    #[test]
    fn frame_completes_on_the_last_sync_bit() {
        let bits = encode(&[0xAA, 0xBB], [0; 4]);
        let mut ootx = OotxDecoder::new();
        let (last, head) = bits.split_last().unwrap();
        assert_eq!(feed(&mut ootx, head), 0);
        assert!(!ootx.is_complete());
        assert!(ootx.add(*last));
    }

    #[test]
    fn leading_noise_does_not_hide_preamble() {
        let mut bits = StdVec::from([1, 0, 1, 1, 0, 0, 0, 1, 0, 0]);
        bits.extend(encode(&[7, 8, 9, 10], [0xC0, 0xFF, 0xEE, 0x00]));
        let mut ootx = OotxDecoder::new();
        assert_eq!(feed(&mut ootx, &bits), 1);
        assert_eq!(ootx.frame().unwrap().payload(), &[7, 8, 9, 10]);
    }

    #[test]
    fn flipped_sync_bit_drops_frame_and_resyncs() {
        let mut bits = encode(&[1, 2, 3, 4, 5, 6], [9, 9, 9, 9]);
        // Sync bit of the second payload word: preamble + length word + two words.
        let sync_index = 18 + 17 + 17 + 16;
        assert_eq!(bits[sync_index], 1);
        bits[sync_index] = 0;
        bits.extend(encode(&[0xAB, 0xCD], [5, 6, 7, 8]));

        let mut ootx = OotxDecoder::new();
        assert_eq!(feed(&mut ootx, &bits), 1);
        let frame = ootx.take_frame().unwrap();
        assert_eq!(frame.payload(), &[0xAB, 0xCD]);
        assert_eq!(frame.crc_bytes(), &[5, 6, 7, 8]);
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut bits = StdVec::new();
        preamble(&mut bits);
        word(&mut bits, 253, 1); // 253 + 4 + padding > 256
        for _ in 0..200 {
            word(&mut bits, 0xFFFF, 1);
        }
        let mut ootx = OotxDecoder::new();
        assert_eq!(feed(&mut ootx, &bits), 0);

        // Largest frame that fits still decodes afterwards.
        let payload = [0x5Au8; 252];
        assert_eq!(feed(&mut ootx, &encode(&payload, [0; 4])), 1);
        assert_eq!(ootx.frame().unwrap().len(), OOTX_CAPACITY);
    }

    #[test]
    fn invalid_bit_value_resets() {
        let bits = encode(&[1, 2], [0; 4]);
        let mut ootx = OotxDecoder::new();
        feed(&mut ootx, &bits[..40]);
        assert!(!ootx.add(2));
        assert_eq!(feed(&mut ootx, &bits[40..]), 0);
        assert_eq!(feed(&mut ootx, &bits), 1);
    }

    #[test]
    fn new_frame_replaces_untaken_one() {
        let mut ootx = OotxDecoder::new();
        feed(&mut ootx, &encode(&[1, 1], [0; 4]));
        feed(&mut ootx, &encode(&[2, 2, 2], [0; 4]));
        assert_eq!(ootx.take_frame().unwrap().payload(), &[2, 2, 2]);
        assert_eq!(ootx.take_frame(), None);
    }
}
