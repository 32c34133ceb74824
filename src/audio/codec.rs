//! # PCM Codec
//!
//! Pure conversion functions between the payload formats exchanged with the
//! remote speech service and the browser:
//!
//! - base64 text ↔ raw bytes (the streaming wire format carries audio as base64)
//! - 16-bit little-endian PCM ↔ normalized float samples
//! - raw PCM → a self-contained WAV container a browser audio element can play
//!
//! ## Audio Format Requirements:
//! - **Bit Depth**: 16-bit PCM
//! - **Encoding**: Little-endian signed integers
//! - **Channels**: Mono everywhere in this application, but the conversions
//!   below accept a channel count so the container stays self-describing.

use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Size of the RIFF/WAVE header emitted by [`pcm_to_wav`]. The produced
/// container is always exactly this many bytes plus the PCM payload.
pub const WAV_HEADER_LEN: usize = 44;

/// Decode a base64 payload into raw bytes.
pub fn decode_base64(data: &str) -> AppResult<Vec<u8>> {
    Ok(BASE64.decode(data)?)
}

/// Encode raw bytes as base64 for the outbound wire format.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Wrap raw PCM bytes in a minimal WAV container.
///
/// ## Header Layout (all multi-byte fields little-endian):
/// - RIFF chunk descriptor: "RIFF", total size - 8, "WAVE"
/// - "fmt " sub-chunk: size 16, format tag 1 (PCM), channels, sample rate,
///   byte rate, block alignment, bits per sample
/// - "data" sub-chunk: size = payload length, then the payload itself
///
/// The writes go into an in-memory Vec, so the unwraps cannot fail.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;
    let data_size = pcm.len() as u32;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());

    // RIFF chunk descriptor
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_size).unwrap();
    out.extend_from_slice(b"WAVE");

    // "fmt " sub-chunk
    out.extend_from_slice(b"fmt ");
    out.write_u32::<LittleEndian>(16).unwrap();
    out.write_u16::<LittleEndian>(1).unwrap(); // PCM format tag
    out.write_u16::<LittleEndian>(channels).unwrap();
    out.write_u32::<LittleEndian>(sample_rate).unwrap();
    out.write_u32::<LittleEndian>(byte_rate).unwrap();
    out.write_u16::<LittleEndian>(block_align).unwrap();
    out.write_u16::<LittleEndian>(bits_per_sample).unwrap();

    // "data" sub-chunk
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_size).unwrap();
    out.extend_from_slice(pcm);

    out
}

/// De-interleave 16-bit PCM bytes into channel-major float vectors.
///
/// Samples are normalized from [-32768, 32767] to [-1.0, 1.0]. Returns one
/// Vec<f32> per channel, each `frames` long where
/// `frames = sample_count / channels`.
///
/// ## Errors:
/// Fails with a DecodeError if the byte length is odd (16-bit samples) or the
/// channel count is zero.
pub fn pcm16_to_float(bytes: &[u8], channels: usize) -> AppResult<Vec<Vec<f32>>> {
    if channels == 0 {
        return Err(AppError::DecodeError("Channel count cannot be zero".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(AppError::DecodeError(
            "Audio data length must be even for 16-bit samples".to_string(),
        ));
    }

    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    let frames = samples.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for (channel, channel_data) in out.iter_mut().enumerate() {
        for frame in 0..frames {
            channel_data.push(samples[frame * channels + channel] as f32 / 32768.0);
        }
    }

    Ok(out)
}

/// Convert float samples back to 16-bit little-endian PCM bytes.
///
/// Out-of-range samples saturate to the i16 limits rather than wrapping.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
        out.write_i16::<LittleEndian>(scaled).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        let bytes = vec![0u8, 1, 2, 254, 255];
        let encoded = encode_base64(&bytes);
        assert_eq!(decode_base64(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_base64_malformed_input() {
        assert!(decode_base64("not base64!!!").is_err());
    }

    #[test]
    fn test_pcm_float_round_trip_within_one_lsb() {
        // Cover the extremes plus ordinary values
        let pcm_samples: Vec<i16> = vec![0, 1, -1, 16384, -16384, 32767, -32768];
        let mut bytes = Vec::new();
        for s in &pcm_samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }

        let floats = pcm16_to_float(&bytes, 1).unwrap();
        let restored = float_to_pcm16(&floats[0]);

        for (i, (orig, back)) in bytes
            .chunks_exact(2)
            .zip(restored.chunks_exact(2))
            .enumerate()
        {
            let a = i16::from_le_bytes([orig[0], orig[1]]) as i32;
            let b = i16::from_le_bytes([back[0], back[1]]) as i32;
            assert!((a - b).abs() <= 1, "sample {} drifted: {} vs {}", i, a, b);
        }
    }

    #[test]
    fn test_pcm16_odd_length_rejected() {
        assert!(pcm16_to_float(&[0u8; 15], 1).is_err());
    }

    #[test]
    fn test_pcm16_deinterleaves_channels() {
        // Two frames of stereo: L=100 R=200, L=300 R=400
        let mut bytes = Vec::new();
        for s in [100i16, 200, 300, 400] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let channels = pcm16_to_float(&bytes, 2).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].len(), 2);
        assert!((channels[0][0] - 100.0 / 32768.0).abs() < f32::EPSILON);
        assert!((channels[1][0] - 200.0 / 32768.0).abs() < f32::EPSILON);
        assert!((channels[0][1] - 300.0 / 32768.0).abs() < f32::EPSILON);
        assert!((channels[1][1] - 400.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_float_to_pcm16_saturates() {
        let out = float_to_pcm16(&[2.0, -2.0]);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 32767);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -32768);
    }

    #[test]
    fn test_wav_container_length_and_header() {
        let pcm = vec![7u8; 4800];
        let wav = pcm_to_wav(&pcm, 24_000, 1, 16);

        assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let mut cursor = Cursor::new(&wav[20..]);
        assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 1); // PCM
        assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 1); // mono
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 24_000);
        assert_eq!(cursor.read_u32::<LittleEndian>().unwrap(), 48_000); // byte rate
        assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 2); // block align
        assert_eq!(cursor.read_u16::<LittleEndian>().unwrap(), 16); // bit depth

        let mut size_cursor = Cursor::new(&wav[40..44]);
        assert_eq!(size_cursor.read_u32::<LittleEndian>().unwrap(), 4800);
        assert_eq!(&wav[44..], &pcm[..]);
    }

    #[test]
    fn test_wav_container_empty_payload() {
        let wav = pcm_to_wav(&[], 24_000, 1, 16);
        assert_eq!(wav.len(), WAV_HEADER_LEN);
    }
}
