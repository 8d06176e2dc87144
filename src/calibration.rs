//! Persistent base station calibration.
//!
//! A record is `magic | payload length | postcard payload | CRC32`, little endian, with
//! the CRC covering everything before it. Boards write the record to whatever
//! non-volatile storage they have and hand the bytes back to [`Calibration::decode`].

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::geometry::LightSource;
use crate::{Error, Result};

const MAGIC: u32 = 0x4C48_434C; // 'LHCL'
const HEADER_SIZE: usize = 6;
const CRC_SIZE: usize = 4;

/// Largest record [`Calibration::encode`] can produce.
pub const MAX_RECORD_SIZE: usize = 128;

const MAX_PAYLOAD_SIZE: usize = MAX_RECORD_SIZE - HEADER_SIZE - CRC_SIZE;

/// Poses of both base stations, in slot order.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub sources: [LightSource; 2],
}

impl Calibration {
    #[must_use]
    pub const fn new(sources: [LightSource; 2]) -> Self {
        Self { sources }
    }

    /// Write the record into `buffer` and return the written prefix.
    ///
    /// # Errors
    /// [`Error::CalibrationTooLarge`] if `buffer` cannot hold the record, or
    /// [`Error::CalibrationEncoding`] if serialization fails.
    pub fn encode<'b>(&self, buffer: &'b mut [u8]) -> Result<&'b [u8]> {
        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        let payload_len = postcard::to_slice(self, &mut payload)?.len();

        let len_bytes = u16::try_from(payload_len)
            .map_err(|_| Error::CalibrationTooLarge)?
            .to_le_bytes();
        let record_len = HEADER_SIZE
            .saturating_add(payload_len)
            .saturating_add(CRC_SIZE);
        let record = buffer
            .get_mut(..record_len)
            .ok_or(Error::CalibrationTooLarge)?;

        let (magic, rest) = record
            .split_first_chunk_mut::<4>()
            .ok_or(Error::CalibrationTooLarge)?;
        *magic = MAGIC.to_le_bytes();
        let (length, rest) = rest
            .split_first_chunk_mut::<2>()
            .ok_or(Error::CalibrationTooLarge)?;
        *length = len_bytes;
        let (body, crc) = rest.split_at_mut(payload_len);
        body.copy_from_slice(payload.get(..payload_len).unwrap_or_default());

        let mut hasher = Hasher::new();
        hasher.update(magic);
        hasher.update(length);
        hasher.update(body);
        crc.copy_from_slice(&hasher.finalize().to_le_bytes());

        log_debug!("calibration: encoded {} bytes", record_len);
        Ok(record)
    }

    /// Read a record written by [`Calibration::encode`].
    ///
    /// Returns `Ok(None)` when `bytes` does not start with a calibration record, as with
    /// erased flash.
    ///
    /// # Errors
    /// [`Error::CalibrationCorrupted`] if the record is truncated, its CRC does not match,
    /// or its payload does not deserialize.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let Some((magic, rest)) = bytes.split_first_chunk::<4>() else {
            return Ok(None);
        };
        if u32::from_le_bytes(*magic) != MAGIC {
            return Ok(None);
        }

        let (len_bytes, rest) = rest
            .split_first_chunk::<2>()
            .ok_or(Error::CalibrationCorrupted)?;
        let payload_len = usize::from(u16::from_le_bytes(*len_bytes));
        if payload_len > MAX_PAYLOAD_SIZE {
            log_warn!("calibration: invalid payload length {}", payload_len);
            return Err(Error::CalibrationCorrupted);
        }

        let payload = rest.get(..payload_len).ok_or(Error::CalibrationCorrupted)?;
        let stored_crc = rest
            .get(payload_len..)
            .and_then(|tail| tail.first_chunk::<CRC_SIZE>())
            .map(|crc| u32::from_le_bytes(*crc))
            .ok_or(Error::CalibrationCorrupted)?;

        let mut hasher = Hasher::new();
        hasher.update(magic);
        hasher.update(len_bytes);
        hasher.update(payload);
        let computed_crc = hasher.finalize();
        if stored_crc != computed_crc {
            log_warn!(
                "calibration: CRC mismatch (expected {}, found {})",
                computed_crc,
                stored_crc
            );
            return Err(Error::CalibrationCorrupted);
        }

        let calibration = postcard::from_bytes(payload).map_err(|_| {
            log_warn!("calibration: payload does not deserialize");
            Error::CalibrationCorrupted
        })?;
        Ok(Some(calibration))
    }
}
