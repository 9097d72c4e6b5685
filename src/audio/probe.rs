//! # Audio Metadata Probing
//!
//! Reads duration and sample rate from uploaded files. Only RIFF/WAVE is
//! decoded; MP3 and FLAC uploads are stored without metadata and engines read
//! them directly.

use std::io::{Read, Seek};
use tracing::debug;

/// What could be learned about an audio file.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioMetadata {
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Probe a WAV stream. Returns empty metadata if the data cannot be decoded.
pub fn probe_wav<R: Read + Seek>(reader: &mut R) -> AudioMetadata {
    let (header, data) = match wav::read(reader) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!(error = %e, "could not decode WAV data");
            return AudioMetadata::default();
        }
    };

    let samples = match &data {
        wav::BitDepth::Eight(samples) => samples.len(),
        wav::BitDepth::Sixteen(samples) => samples.len(),
        wav::BitDepth::TwentyFour(samples) => samples.len(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples.len(),
        wav::BitDepth::Empty => 0,
    };

    let channels = header.channel_count.max(1);
    let duration_secs = (header.sampling_rate > 0)
        .then(|| (samples / channels as usize) as f64 / header.sampling_rate as f64);

    AudioMetadata {
        duration_secs,
        sample_rate: Some(header.sampling_rate),
        channels: Some(header.channel_count),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::wav_bytes;
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_probe_mono_wav() {
        let bytes = wav_bytes(16_000, 1, 32_000);
        let meta = probe_wav(&mut Cursor::new(bytes));
        assert_eq!(meta.sample_rate, Some(16_000));
        assert_eq!(meta.channels, Some(1));
        assert_eq!(meta.duration_secs, Some(2.0));
    }

    #[test]
    fn test_probe_stereo_counts_frames() {
        let bytes = wav_bytes(8_000, 2, 4_000);
        let meta = probe_wav(&mut Cursor::new(bytes));
        assert_eq!(meta.duration_secs, Some(0.5));
    }

    #[test]
    fn test_garbage_yields_no_metadata() {
        let meta = probe_wav(&mut Cursor::new(b"not audio at all".to_vec()));
        assert_eq!(meta, AudioMetadata::default());
    }
}
