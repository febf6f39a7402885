//! Media container probing
//!
//! Reads the playback length from a file's container headers using lofty.
//! Formats lofty doesn't understand (mkv, avi, wmv) report no duration.

use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Playback length of the media file at `path`, or zero when it can't be read
pub fn probe_duration(path: &Path) -> Duration {
    match read_duration(path) {
        Ok(duration) => {
            debug!(file = %path.display(), duration_ms = duration.as_millis() as u64, "Probed duration");
            duration
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Could not read media duration");
            Duration::ZERO
        }
    }
}

fn read_duration(path: &Path) -> lofty::error::Result<Duration> {
    let tagged_file = Probe::open(path)?.read()?;
    Ok(tagged_file.properties().duration())
}

/// Mono 8-bit PCM WAV holding `seconds` of silence at 8 kHz
#[cfg(test)]
pub(crate) fn wav_bytes(seconds: u32) -> Vec<u8> {
    const SAMPLE_RATE: u32 = 8_000;
    let data_len = SAMPLE_RATE * seconds;

    let mut wav = Vec::new();
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // channels
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    wav.extend_from_slice(&SAMPLE_RATE.to_le_bytes()); // byte rate
    wav.extend_from_slice(&1u16.to_le_bytes()); // block align
    wav.extend_from_slice(&8u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.resize(wav.len() + data_len as usize, 0x80);
    wav
}
