use std::io::Cursor;
use std::path::Path;

use crate::error::Result;

const I16_MAX_F32: f32 = i16::MAX as f32;

fn mono_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W>(writer: &mut hound::WavWriter<W>, samples: &[f32]) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    for &s in samples {
        // Clamp and convert f32 [-1.0, 1.0] -> i16
        let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
        writer.write_sample(v)?;
    }
    Ok(())
}

/// Encode mono f32 samples as a 16-bit PCM WAV (RIFF) byte buffer.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    // WAV header (44 bytes) + samples (2 bytes per sample)
    let estimated_size = 44 + samples.len() * 2;
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(estimated_size));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, mono_spec(sample_rate))?;
        write_samples(&mut writer, samples)?;
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write mono f32 samples to `path` as 16-bit PCM WAV.
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::create(path.as_ref(), mono_spec(sample_rate))?;
    write_samples(&mut writer, samples)?;
    writer.finalize()?;
    Ok(())
}
