//! End-to-end runs: synthetic base station cycles pushed through the capture interrupt,
//! decoded by a sensor pipeline into positions and an OOTX frame.
#![expect(
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::indexing_slicing,
    reason = "synthetic pulse trains stay far from u32::MAX and index fixed tables"
)]

use core::f32::consts::PI;

use lighthouse_tracker::capture_mock::MockCaptureTimer;
use lighthouse_tracker::{
    CaptureChannel, CaptureRegistry, EdgeBuffer, Error, LightSource, LighthouseSensor, OverflowClock,
    Polarity, PositionSolver, PulseEvent, PulseTiming, SensorPipeline, TrackerEvent,
};

const TPU: u32 = 48;
const TIMING: PulseTiming = PulseTiming::new(TPU);
const CYCLE: u32 = 8_333 * TPU;
const FLASH_GAP: u32 = 400 * TPU;
const SWEEP_WIDTH: u32 = 10 * TPU;

const STATION_A: [f32; 3] = [-1.0, 0.5, 2.0];
const STATION_B: [f32; 3] = [1.2, 0.4, 2.1];
const TARGET: [f32; 3] = [0.2, -0.3, 0.4];

/// Drives the capture interrupt the way the hardware timer would.
struct Bench<'a> {
    timer: MockCaptureTimer,
    registry: CaptureRegistry<'a>,
}

impl Bench<'_> {
    fn edge(&mut self, channel: CaptureChannel, tick: u32) {
        let high = (tick >> 16) as u16;
        while self.registry.clock().overflow_count() != high {
            self.timer.raise_overflow();
            self.registry.on_interrupt(&mut self.timer);
        }
        self.timer.latch(channel, tick as u16);
        self.registry.on_interrupt(&mut self.timer);
    }
}

#[derive(Clone, Copy)]
struct Pulse {
    start: u32,
    width: u32,
}

fn sync_width(skip: bool, axis: u8, data: u8) -> u32 {
    let index = (usize::from(skip) << 2) | (usize::from(axis) << 1) | usize::from(data);
    TIMING.sync_centers[index]
}

/// Sweep offset, in ticks, at which a station at `origin` sees `TARGET` on `axis`.
fn sweep_delta(origin: [f32; 3], axis: u8) -> u32 {
    let [dx, dy, dz] = [0, 1, 2].map(|i| TARGET[i] - origin[i]);
    let angle = if axis == 0 {
        (dx / dz).atan()
    } else {
        (-dy / dz).atan()
    };
    let offset = angle * TIMING.half_rotation as f32 / PI;
    (TIMING.sweep_center as f32 + offset).round() as u32
}

/// Pulses for `count` cycles starting at `first`, sweeping A0, B0, A1, B1 in turn.
///
/// Station A's flashes carry `ootx_bits` in order, then zeros.
fn cycles(first: u32, start: u32, count: u32, ootx_bits: &[u8]) -> Vec<Pulse> {
    let mut pulses = Vec::new();
    let mut bits = ootx_bits.iter().copied();
    for k in first..first + count {
        let cycle_start = start + (k - first) * CYCLE;
        let axis = ((k / 2) % 2) as u8;
        let (first_width, second_width, zero, origin) = if k % 2 == 0 {
            let data = bits.next().unwrap_or(0);
            (
                sync_width(true, 0, 0),
                sync_width(false, axis, data),
                cycle_start + FLASH_GAP,
                STATION_A,
            )
        } else {
            (
                sync_width(false, axis, 0),
                sync_width(true, 0, 0),
                cycle_start,
                STATION_B,
            )
        };
        pulses.push(Pulse {
            start: cycle_start,
            width: first_width,
        });
        pulses.push(Pulse {
            start: cycle_start + FLASH_GAP,
            width: second_width,
        });
        let middle = zero + sweep_delta(origin, axis);
        pulses.push(Pulse {
            start: middle - SWEEP_WIDTH / 2,
            width: SWEEP_WIDTH,
        });
    }
    pulses
}

fn ootx_bits(payload: &[u8], crc: [u8; 4]) -> Vec<u8> {
    fn word(bits: &mut Vec<u8>, word: u16) {
        bits.extend((0..16).rev().map(|i| ((word >> i) & 1) as u8));
        bits.push(1);
    }

    let mut bits = vec![0u8; 17];
    bits.push(1);
    word(&mut bits, payload.len() as u16);
    let mut bytes: Vec<u8> = payload.iter().copied().chain(crc).collect();
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    for pair in bytes.chunks(2) {
        word(&mut bits, u16::from_be_bytes([pair[0], pair[1]]));
    }
    bits
}

fn assert_near_target(position: [f32; 3]) {
    for (got, want) in position.iter().zip(TARGET) {
        assert!((got - want).abs() < 1e-3, "{position:?} is not near {TARGET:?}");
    }
}

#[test]
fn cycles_produce_positions_and_an_ootx_frame() {
    let clock = OverflowClock::new();
    let rising = EdgeBuffer::new();
    let falling = EdgeBuffer::new();
    let mut bench = Bench {
        timer: MockCaptureTimer::new(),
        registry: CaptureRegistry::new(&clock),
    };
    let rising_capture = bench
        .registry
        .claim(&mut bench.timer, CaptureChannel::Ch4, Polarity::Rising, &rising)
        .unwrap();
    let falling_capture = bench
        .registry
        .claim(&mut bench.timer, CaptureChannel::Ch5, Polarity::Falling, &falling)
        .unwrap();
    assert_eq!(bench.timer.polarity(CaptureChannel::Ch4), Some(Polarity::Rising));

    let sensor = LighthouseSensor::new(2, rising_capture, falling_capture, TIMING);
    let solver = PositionSolver::new(2, [LightSource::at(STATION_A), LightSource::at(STATION_B)]);
    let mut pipeline = SensorPipeline::new(sensor, solver);

    let bits = ootx_bits(&[0x12, 0x34, 0x56], [0xA1, 0xB2, 0xC3, 0xD4]);
    let pulses = cycles(0, 1_000, 2 * bits.len() as u32 + 8, &bits);

    let mut positions = Vec::new();
    let mut frames = Vec::new();
    for pulse in pulses {
        bench.edge(CaptureChannel::Ch5, pulse.start);
        bench.edge(CaptureChannel::Ch4, pulse.start + pulse.width);
        while let Some(event) = pipeline.poll() {
            match event {
                TrackerEvent::Position { sensor, fix } => {
                    assert_eq!(sensor, 2);
                    positions.push(fix);
                }
                TrackerEvent::OotxFrame { frame, .. } => frames.push(frame),
            }
        }
    }

    // One solve per four cycles; the first set completes on cycle 3.
    assert_eq!(positions.len(), (2 * bits.len() + 8) / 4);
    for fix in &positions {
        assert_near_target(fix.position);
        assert!(fix.distance < 1e-3);
    }

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload(), &[0x12, 0x34, 0x56]);
    assert_eq!(frames[0].crc_bytes(), &[0xA1, 0xB2, 0xC3, 0xD4]);
    assert!(clock.overflow_count() > 100);
}

#[test]
fn backlog_is_reported_then_tracking_resumes() {
    let clock = OverflowClock::new();
    let rising = EdgeBuffer::new();
    let falling = EdgeBuffer::new();
    let mut bench = Bench {
        timer: MockCaptureTimer::new(),
        registry: CaptureRegistry::new(&clock),
    };
    let rising_capture = bench
        .registry
        .claim(&mut bench.timer, CaptureChannel::Ch0, Polarity::Rising, &rising)
        .unwrap();
    let falling_capture = bench
        .registry
        .claim(&mut bench.timer, CaptureChannel::Ch1, Polarity::Falling, &falling)
        .unwrap();
    let sensor = LighthouseSensor::new(0, rising_capture, falling_capture, TIMING);
    let solver = PositionSolver::new(0, [LightSource::at(STATION_A), LightSource::at(STATION_B)]);
    let mut pipeline = SensorPipeline::new(sensor, solver);

    // 30 cycles of 3 pulses each overrun both 64-sample rings before anything is polled.
    for pulse in cycles(0, 500, 30, &[]) {
        bench.edge(CaptureChannel::Ch1, pulse.start);
        bench.edge(CaptureChannel::Ch0, pulse.start + pulse.width);
    }
    assert!(rising.pending() > 64);

    let mut losses = 0;
    let mut trace = |event: &PulseEvent| {
        if matches!(event, PulseEvent::SampleLoss { .. }) {
            losses += 1;
        }
    };
    let mut drained = 0;
    loop {
        let before = rising.pending();
        pipeline.poll_with(&mut trace);
        if before == 0 {
            break;
        }
        drained += 1;
    }
    assert_eq!(losses, 1);
    assert_eq!(drained, 63);

    let start = 500 + 30 * CYCLE;
    let mut last = None;
    for pulse in cycles(30, start, 12, &[]) {
        bench.edge(CaptureChannel::Ch1, pulse.start);
        bench.edge(CaptureChannel::Ch0, pulse.start + pulse.width);
        if let Some(TrackerEvent::Position { fix, .. }) = pipeline.poll() {
            last = Some(fix);
        }
    }
    assert_near_target(last.expect("tracking resumed").position);
}

#[test]
fn reusing_a_running_sensors_buffer_is_rejected() {
    let clock = OverflowClock::new();
    let rising = EdgeBuffer::new();
    let falling = EdgeBuffer::new();
    let mut bench = Bench {
        timer: MockCaptureTimer::new(),
        registry: CaptureRegistry::new(&clock),
    };
    let rising_capture = bench
        .registry
        .claim(&mut bench.timer, CaptureChannel::Ch0, Polarity::Rising, &rising)
        .unwrap();
    let falling_capture = bench
        .registry
        .claim(&mut bench.timer, CaptureChannel::Ch1, Polarity::Falling, &falling)
        .unwrap();
    let sensor = LighthouseSensor::new(0, rising_capture, falling_capture, TIMING);
    let solver = PositionSolver::new(0, [LightSource::at(STATION_A), LightSource::at(STATION_B)]);
    let mut pipeline = SensorPipeline::new(sensor, solver);

    let mut losses = 0;
    let mut trace = |event: &PulseEvent| {
        if matches!(event, PulseEvent::SampleLoss { .. }) {
            losses += 1;
        }
    };
    let mut positions = Vec::new();
    for (index, pulse) in cycles(0, 500, 16, &[]).into_iter().enumerate() {
        bench.edge(CaptureChannel::Ch1, pulse.start);
        bench.edge(CaptureChannel::Ch0, pulse.start + pulse.width);

        // A second sensor wired to Ch2/Ch3 by mistake hands over the first one's buffer
        // while an edge is still unread.
        if index == 18 {
            assert_eq!(rising.pending(), 1);
            let err = bench
                .registry
                .claim(&mut bench.timer, CaptureChannel::Ch2, Polarity::Rising, &rising)
                .unwrap_err();
            assert!(matches!(err, Error::BufferClaimed(CaptureChannel::Ch0)));
            assert_eq!(bench.timer.polarity(CaptureChannel::Ch2), None);
            assert_eq!(rising.pending(), 1);
        }

        while let Some(event) = pipeline.poll_with(&mut trace) {
            if let TrackerEvent::Position { fix, .. } = event {
                positions.push(fix);
            }
        }
    }

    assert_eq!(losses, 0);
    assert_eq!(positions.len(), 4);
    for fix in &positions {
        assert_near_target(fix.position);
    }
}
