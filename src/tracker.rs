//! Cooperative polling task that runs every sensor pipeline and publishes what they find.
//!
//! Capture interrupts fill the edge buffers; this task drains them, so it must run often
//! enough that no buffer falls [`SAMPLE_COUNT`](crate::SAMPLE_COUNT) edges behind. It
//! yields to the executor after each pass instead of sleeping.

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel as EmbassyChannel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};
use heapless::Vec;

use crate::geometry::Fix;
use crate::ootx::OotxFrame;
use crate::pipeline::{SensorPipeline, TrackerEvent};
use crate::shared_constants::MAX_SENSORS;
use crate::{Error, Result};

// ===== Public API ===========================================================

/// Positions queue up; frames are rare, so only the latest one is held.
type PositionChannel = EmbassyChannel<CriticalSectionRawMutex, (u8, Fix), 8>;
type FrameSignal = Signal<CriticalSectionRawMutex, (u8, OotxFrame)>;

type Pipelines = Vec<SensorPipeline<'static>, MAX_SENSORS>;

const RATE_PERIOD: Duration = Duration::from_secs(1);

/// Static storage for the [`Tracker`].
///
/// A 256-byte [`OotxFrame`] would make every queued position as large as a frame, so
/// frames travel in their own one-slot signal beside the position queue.
pub struct TrackerStatic {
    positions: PositionChannel,
    frame: FrameSignal,
}

/// Handle to the running tracker task.
///
/// ```rust,ignore
/// static TRACKER: TrackerStatic = Tracker::new_static();
///
/// let tracker = Tracker::new([pipeline0, pipeline1], &TRACKER, spawner)?;
/// loop {
///     match tracker.wait().await {
///         TrackerEvent::Position { sensor, fix } => info!("{}: {}", sensor, fix),
///         TrackerEvent::OotxFrame { frame, .. } => info!("OOTX {} bytes", frame.len()),
///     }
/// }
/// ```
pub struct Tracker<'a> {
    shared: &'a TrackerStatic,
}

impl Tracker<'_> {
    #[must_use]
    pub const fn new_static() -> TrackerStatic {
        TrackerStatic {
            positions: EmbassyChannel::new(),
            frame: Signal::new(),
        }
    }

    /// Spawn the polling task over the given pipelines.
    ///
    /// # Errors
    /// [`Error::TrackerFull`] if more than [`MAX_SENSORS`](crate::MAX_SENSORS) pipelines
    /// are given, or [`Error::TaskSpawn`] if the task is already running.
    pub fn new(
        pipelines: impl IntoIterator<Item = SensorPipeline<'static>>,
        shared: &'static TrackerStatic,
        spawner: Spawner,
    ) -> Result<Self> {
        let mut owned = Pipelines::new();
        for pipeline in pipelines {
            owned.push(pipeline).map_err(|_| Error::TrackerFull)?;
        }
        spawner
            .spawn(tracker_task(owned, shared))
            .map_err(Error::TaskSpawn)?;
        Ok(Self { shared })
    }

    /// Wait for the next position fix or OOTX frame.
    ///
    /// A frame that arrives while an earlier one is still unread replaces it.
    pub async fn wait(&self) -> TrackerEvent {
        match select(self.shared.positions.receive(), self.shared.frame.wait()).await {
            Either::First((sensor, fix)) => TrackerEvent::Position { sensor, fix },
            Either::Second((sensor, frame)) => TrackerEvent::OotxFrame { sensor, frame },
        }
    }

    /// The next event, if one is already waiting.
    pub fn try_next(&self) -> Option<TrackerEvent> {
        if let Ok((sensor, fix)) = self.shared.positions.try_receive() {
            return Some(TrackerEvent::Position { sensor, fix });
        }
        self.shared
            .frame
            .try_take()
            .map(|(sensor, frame)| TrackerEvent::OotxFrame { sensor, frame })
    }
}

// ===== The non-generic task =================================================

#[embassy_executor::task]
async fn tracker_task(mut pipelines: Pipelines, shared: &'static TrackerStatic) -> ! {
    let mut fixes: u32 = 0;
    let mut window_start = Instant::now();

    log_info!("tracker task started with {} sensors", pipelines.len());
    loop {
        for pipeline in &mut pipelines {
            match pipeline.poll() {
                Some(TrackerEvent::Position { sensor, fix }) => {
                    fixes = fixes.wrapping_add(1);
                    if shared.positions.try_send((sensor, fix)).is_err() {
                        log_warn!("tracker: position queue full, dropping fix");
                    }
                }
                Some(TrackerEvent::OotxFrame { sensor, frame }) => {
                    if shared.frame.signaled() {
                        log_warn!("tracker: replacing unread OOTX frame");
                    }
                    shared.frame.signal((sensor, frame));
                }
                None => {}
            }
        }

        let now = Instant::now();
        if now.duration_since(window_start) >= RATE_PERIOD {
            log_info!("tracker: {} fixes/s", fixes);
            fixes = 0;
            window_start = now;
        }

        yield_now().await;
    }
}
