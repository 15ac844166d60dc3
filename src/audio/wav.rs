use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::playback::AudioChunk;
use crate::error::{PipelineError, PipelineResult};

fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// 16-bit mono WAV in memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> PipelineResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, mono_spec(sample_rate))?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

pub fn is_riff_wave(payload: &[u8]) -> bool {
    payload.len() >= 12 && &payload[..4] == b"RIFF" && &payload[8..12] == b"WAVE"
}

/// Decode a synthesis payload. RIFF/WAVE payloads carry their own rate and
/// are down-mixed to mono; anything else is raw little-endian 16-bit PCM at
/// `default_rate` (a trailing odd byte is dropped).
pub fn decode_pcm(payload: &[u8], default_rate: u32) -> PipelineResult<AudioChunk> {
    if !is_riff_wave(payload) {
        let samples = payload
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        return Ok(AudioChunk::new(samples, default_rate));
    }

    let mut reader = WavReader::new(Cursor::new(payload))?;
    let spec = reader.spec();
    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<Result<_, _>>()?,
        (format, bits) => {
            return Err(PipelineError::Protocol(format!(
                "unsupported wav payload: {:?} {} bit",
                format, bits
            )))
        }
    };

    let channels = spec.channels.max(1) as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / frame.len() as i32) as i16)
            .collect()
    };

    Ok(AudioChunk::new(samples, spec.sample_rate))
}

/// Write one turn's audio to `dir` as a timestamped WAV file.
pub fn save_recording(dir: &Path, chunks: &[AudioChunk]) -> PipelineResult<Option<PathBuf>> {
    let Some(first) = chunks.iter().find(|c| !c.samples.is_empty()) else {
        return Ok(None);
    };
    let sample_rate = first.sample_rate;

    std::fs::create_dir_all(dir)?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let path = dir.join(format!("speech_output_{}.wav", stamp));

    let mut writer = WavWriter::create(&path, mono_spec(sample_rate))?;
    for chunk in chunks {
        if chunk.sample_rate != sample_rate {
            tracing::warn!(
                "Recording skips chunk at {}Hz (file is {}Hz)",
                chunk.sample_rate, sample_rate
            );
            continue;
        }
        for &sample in &chunk.samples {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_pcm_drops_odd_byte() {
        let chunk = decode_pcm(&[0x01, 0x00, 0xff, 0x7f, 0x09], 24000).unwrap();
        assert_eq!(chunk.samples, vec![1, i16::MAX]);
        assert_eq!(chunk.sample_rate, 24000);
    }

    #[test]
    fn riff_payload_uses_header_rate() {
        let bytes = encode_wav(&[10, -10, 300], 22050).unwrap();
        assert!(is_riff_wave(&bytes));
        let chunk = decode_pcm(&bytes, 24000).unwrap();
        assert_eq!(chunk.sample_rate, 22050);
        assert_eq!(chunk.samples, vec![10, -10, 300]);
    }

    #[test]
    fn stereo_wav_is_downmixed() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let spec = WavSpec { channels: 2, ..mono_spec(16000) };
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in [100i16, 300, -50, -150] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let chunk = decode_pcm(&cursor.into_inner(), 24000).unwrap();
        assert_eq!(chunk.samples, vec![200, -100]);
    }

    #[test]
    fn recording_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![AudioChunk::new(vec![1, 2, 3], 24000), AudioChunk::new(vec![4], 24000)];
        let path = save_recording(dir.path(), &chunks).unwrap().unwrap();
        let reader = WavReader::open(path).unwrap();
        assert_eq!(reader.len(), 4);
        assert!(save_recording(dir.path(), &[]).unwrap().is_none());
    }
}
