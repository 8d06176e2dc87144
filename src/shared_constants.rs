/// Samples held per capture channel before the oldest are overwritten.
pub const SAMPLE_COUNT: usize = 64;

/// Timer channels that can capture edges.
pub const CHANNEL_COUNT: usize = 8;

/// Captured low words at or above this value are assumed to precede a concurrent wrap.
pub const HIGH_WATER: u16 = 0xE000;

/// Largest OOTX frame (payload + CRC32 + padding) the decoder will buffer.
pub const OOTX_CAPACITY: usize = 256;

/// Angle slots per sensor: two rotor axes for each of two base stations.
pub const SLOT_COUNT: usize = 4;

/// Sensors a single tracker task can poll.
pub const MAX_SENSORS: usize = 4;

/// Capture timer ticks per microsecond, set at build time from `LIGHTHOUSE_TICKS_PER_US`.
pub const TICKS_PER_MICROSECOND: u32 = parse_u32(env!("LIGHTHOUSE_TICKS_PER_US"));

const fn parse_u32(text: &str) -> u32 {
    let mut rest = text.as_bytes();
    assert!(!rest.is_empty(), "LIGHTHOUSE_TICKS_PER_US is empty");
    let mut value: u32 = 0;
    while let [digit, tail @ ..] = rest {
        assert!(
            digit.is_ascii_digit(),
            "LIGHTHOUSE_TICKS_PER_US must be decimal"
        );
        let Some(shifted) = value.checked_mul(10) else {
            panic!("LIGHTHOUSE_TICKS_PER_US is too large");
        };
        let Some(next) = shifted.checked_add(digit.wrapping_sub(b'0') as u32) else {
            panic!("LIGHTHOUSE_TICKS_PER_US is too large");
        };
        value = next;
        rest = tail;
    }
    value
}
