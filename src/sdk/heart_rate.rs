use thiserror::Error;
use tracing::instrument;

use super::model::HrSample;

const FLAG_HR_U16: u8 = 0x01;
const FLAG_CONTACT_DETECTED: u8 = 0x02;
const FLAG_CONTACT_SUPPORTED: u8 = 0x04;
const FLAG_ENERGY_EXPENDED: u8 = 0x08;
const FLAG_RR_PRESENT: u8 = 0x10;

/// Errors returned while decoding Heart Rate Measurement (`0x2A37`) payloads.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum HeartRateDecodeError {
    #[error("heart rate measurement payload was empty")]
    EmptyPayload,
    #[error("heart rate measurement payload is truncated: needed {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
}

/// Decodes one Heart Rate Measurement notification.
///
/// RR intervals arrive in 1/1024 s units and are converted to milliseconds.
///
/// # Errors
///
/// Returns an error when the payload is empty or shorter than its flags declare.
#[instrument(skip(payload), level = "trace", fields(payload_len = payload.len()))]
pub fn decode_heart_rate_measurement(payload: &[u8]) -> Result<HrSample, HeartRateDecodeError> {
    let Some((&flags, rest)) = payload.split_first() else {
        return Err(HeartRateDecodeError::EmptyPayload);
    };

    let hr_width = if flags & FLAG_HR_U16 == 0 { 1 } else { 2 };
    let energy_width = if flags & FLAG_ENERGY_EXPENDED == 0 { 0 } else { 2 };
    let needed = 1 + hr_width + energy_width;
    if payload.len() < needed {
        return Err(HeartRateDecodeError::Truncated {
            needed,
            actual: payload.len(),
        });
    }

    let hr = if hr_width == 1 {
        u16::from(rest[0])
    } else {
        u16::from_le_bytes([rest[0], rest[1]])
    };

    let rr_available = flags & FLAG_RR_PRESENT != 0;
    let rrs_ms = if rr_available {
        rest[hr_width + energy_width..]
            .chunks_exact(2)
            .map(|pair| rr_to_millis(u16::from_le_bytes([pair[0], pair[1]])))
            .collect()
    } else {
        Vec::new()
    };

    let contact_status_supported = flags & FLAG_CONTACT_SUPPORTED != 0;
    Ok(HrSample {
        hr,
        rrs_ms,
        rr_available,
        contact_status: contact_status_supported && flags & FLAG_CONTACT_DETECTED != 0,
        contact_status_supported,
    })
}

fn rr_to_millis(raw: u16) -> u16 {
    let millis = u32::from(raw) * 1000 / 1024;
    u16::try_from(millis).unwrap_or(u16::MAX)
}
