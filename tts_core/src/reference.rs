//! Reference voice clips.
//!
//! The engine receives the uploaded clip as a file path and decides what to
//! do with it. Here we only make sure the bytes are a container symphonia
//! recognises and that the clip is not known to be empty.

use std::io::Cursor;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, TtsError};

/// What probing a reference clip found out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceInfo {
    /// File extension used when the clip is stored for the engine.
    pub extension: &'static str,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    /// `None` when the container does not record a frame count (e.g. VBR MP3).
    pub duration_ms: Option<u64>,
}

/// Probe an uploaded clip (WAV, MP3, FLAC, OGG, AAC, ...).
pub fn probe_reference(bytes: &[u8]) -> Result<ReferenceInfo> {
    if bytes.is_empty() {
        return Err(TtsError::Validation("reference audio is empty".to_string()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| TtsError::Validation(format!("reference audio format not recognised: {e}")))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| TtsError::Validation("reference audio has no audio track".to_string()))?;
    let params = &track.codec_params;
    let sample_rate = params.sample_rate;
    let duration_ms = match (params.n_frames, sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames * 1000 / rate as u64),
        _ => None,
    };
    if duration_ms == Some(0) {
        return Err(TtsError::Validation("reference audio is empty".to_string()));
    }

    Ok(ReferenceInfo {
        extension: extension(bytes),
        sample_rate,
        channels: params.channels.map(|c| c.count()),
        duration_ms,
    })
}

fn extension(bytes: &[u8]) -> &'static str {
    match bytes {
        [b'R', b'I', b'F', b'F', ..] => "wav",
        [b'f', b'L', b'a', b'C', ..] => "flac",
        [b'O', b'g', b'g', b'S', ..] => "ogg",
        [b'I', b'D', b'3', ..] => "mp3",
        // ADTS uses layer bits 00, MPEG audio layers are non-zero
        [0xFF, b, ..] if b & 0xF0 == 0xF0 && b & 0x06 == 0 => "aac",
        [0xFF, b, ..] if b & 0xE0 == 0xE0 => "mp3",
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => "m4a",
        _ => "audio",
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::wav::encode_wav;

    /// A FLAC stream with only a STREAMINFO block: mono, 16-bit.
    pub(crate) fn flac_header(sample_rate: u32, total_samples: u64) -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();
        // last metadata block, type STREAMINFO, 34 bytes
        bytes.extend_from_slice(&[0x80, 0x00, 0x00, 0x22]);
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 6]);
        let packed: u64 = ((sample_rate as u64) << 44) | (15u64 << 36) | total_samples;
        bytes.extend_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&[0; 16]);
        bytes
    }

    #[test]
    fn test_probe_wav_clip() {
        let bytes = encode_wav(&vec![0.0f32; 24_000], 24_000).unwrap();
        let info = probe_reference(&bytes).unwrap();
        assert_eq!(info.extension, "wav");
        assert_eq!(info.sample_rate, Some(24_000));
        assert_eq!(info.channels, Some(1));
        assert_eq!(info.duration_ms, Some(1_000));
    }

    #[test]
    fn test_probe_flac_clip() {
        let info = probe_reference(&flac_header(16_000, 32_000)).unwrap();
        assert_eq!(info.extension, "flac");
        assert_eq!(info.sample_rate, Some(16_000));
        assert_eq!(info.duration_ms, Some(2_000));
    }

    #[test]
    fn test_probe_rejects_garbage_and_empty() {
        for bytes in [&b""[..], b"not audio at all"] {
            assert!(matches!(probe_reference(bytes), Err(TtsError::Validation(_))));
        }
        let silent = encode_wav(&[], 16_000).unwrap();
        assert!(matches!(probe_reference(&silent), Err(TtsError::Validation(_))));
    }

    #[test]
    fn test_extension_sniffing() {
        assert_eq!(extension(b"ID3\x04\x00"), "mp3");
        assert_eq!(extension(&[0xFF, 0xFB, 0x90, 0x64]), "mp3");
        assert_eq!(extension(&[0xFF, 0xF1, 0x50, 0x80]), "aac");
        assert_eq!(extension(b"OggS\x00\x02"), "ogg");
        assert_eq!(extension(b"\x00\x00\x00\x20ftypM4A "), "m4a");
        assert_eq!(extension(b"????"), "audio");
    }
}
