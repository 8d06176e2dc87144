use derive_more::derive::{Display, Error};

use crate::capture::CaptureChannel;

/// A specialized `Result` where the error is this crate's `Error` type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Define a unified error type for this crate.
///
/// Decode-layer problems (lost samples, unmatched pulse widths, broken OOTX framing,
/// degenerate geometry) are never errors: those stages resynchronize on their own. Only
/// setup-time conflicts and calibration storage problems surface here.
#[derive(Debug, Display, Error)]
pub enum Error {
    // `#[error(not(source))]` below tells `derive_more` that `embassy_executor::SpawnError` does
    // not implement Rust's `core::error::Error` trait.
    #[cfg(feature = "embassy")]
    #[display("{_0:?}")]
    TaskSpawn(#[error(not(source))] embassy_executor::SpawnError),

    #[display("Capture channel {_0:?} is already claimed")]
    ChannelClaimed(#[error(not(source))] CaptureChannel),

    #[display("Edge buffer is already fed by capture channel {_0:?}")]
    BufferClaimed(#[error(not(source))] CaptureChannel),

    #[display("Tracker already holds the maximum number of sensors")]
    TrackerFull,

    #[display("Buffer too small for encoded calibration")]
    CalibrationTooLarge,

    #[display("Stored calibration failed its CRC check")]
    CalibrationCorrupted,

    #[display("Calibration encoding failed: {_0:?}")]
    CalibrationEncoding(#[error(not(source))] postcard::Error),
}

#[cfg(feature = "embassy")]
impl From<embassy_executor::SpawnError> for Error {
    fn from(err: embassy_executor::SpawnError) -> Self {
        Self::TaskSpawn(err)
    }
}

impl From<postcard::Error> for Error {
    fn from(err: postcard::Error) -> Self {
        Self::CalibrationEncoding(err)
    }
}
