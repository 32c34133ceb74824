//! # Audio Capture Pipeline
//!
//! Turns microphone input into outbound PCM frames for the streaming session.
//! The browser delivers mono float sample blocks at whatever rate its input
//! device runs at; this pipeline resamples them to the fixed capture rate,
//! chunks them into fixed-size frames, and converts each frame to a
//! base64-encoded PCM16 payload tagged with its format descriptor
//! (`audio/pcm;rate=16000`).
//!
//! Frame production is pure and synchronous so it can never stall the
//! delivery path; actually submitting frames to the transport is the caller's
//! fire-and-forget concern.

use crate::audio::codec;

/// One outbound audio frame in the streaming wire format: base64-encoded
/// 16-bit PCM plus a MIME-like format descriptor. Produced once by the
/// pipeline and consumed exactly once by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub data: String,
    pub mime_type: String,
}

/// Configuration for the capture pipeline.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate of the incoming device stream (Hz)
    pub device_sample_rate: u32,

    /// Fixed rate frames are resampled to before streaming (Hz)
    pub capture_sample_rate: u32,

    /// Number of samples per outbound frame
    pub frame_samples: usize,
}

/// Accumulates resampled microphone samples and emits fixed-size frames.
///
/// ## Lifecycle:
/// Runs from session start until explicit teardown. [`CapturePipeline::close`]
/// is idempotent and drops any partial frame still pending.
pub struct CapturePipeline {
    config: CaptureConfig,
    mime_type: String,
    pending: Vec<f32>,
    closed: bool,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig) -> Self {
        let mime_type = format!("audio/pcm;rate={}", config.capture_sample_rate);
        Self {
            config,
            mime_type,
            pending: Vec::new(),
            closed: false,
        }
    }

    /// Feed a block of mono float samples at the device rate.
    ///
    /// Returns every completed frame, in order. Samples left over after the
    /// last full frame stay pending for the next block.
    pub fn push_samples(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        if self.closed || samples.is_empty() {
            return Vec::new();
        }

        self.pending
            .extend(resample(samples, self.config.device_sample_rate, self.config.capture_sample_rate));

        let mut frames = Vec::new();
        while self.pending.len() >= self.config.frame_samples {
            let chunk: Vec<f32> = self.pending.drain(..self.config.frame_samples).collect();
            frames.push(self.encode_frame(&chunk));
        }
        frames
    }

    /// Flush the pending partial frame, if any.
    ///
    /// Used when the microphone stops mid-frame so the tail of the recording
    /// still reaches the service.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.closed || self.pending.is_empty() {
            return None;
        }
        let chunk: Vec<f32> = self.pending.drain(..).collect();
        Some(self.encode_frame(&chunk))
    }

    /// Tear down the pipeline and drop any pending samples.
    ///
    /// Safe to call multiple times; after the first call the pipeline
    /// silently ignores further input.
    pub fn close(&mut self) {
        self.pending.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn encode_frame(&self, samples: &[f32]) -> AudioFrame {
        AudioFrame {
            data: codec::encode_base64(&codec::float_to_pcm16(samples)),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Resample mono float samples with nearest-index decimation/interpolation.
///
/// Speech streamed to the recognition service tolerates this cheap method;
/// equal rates pass through untouched.
fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;
    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = (i as f64 / ratio) as usize;
        if src_idx < samples.len() {
            resampled.push(samples[src_idx]);
        }
    }
    resampled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(device_rate: u32) -> CapturePipeline {
        CapturePipeline::new(CaptureConfig {
            device_sample_rate: device_rate,
            capture_sample_rate: 16_000,
            frame_samples: 4096,
        })
    }

    #[test]
    fn test_fixed_size_framing() {
        let mut p = pipeline(16_000);

        // 5000 samples: one full frame out, 904 pending
        let frames = p.push_samples(&vec![0.25f32; 5000]);
        assert_eq!(frames.len(), 1);

        // 4096 base64-encoded 16-bit samples = 8192 bytes of PCM
        let pcm = codec::decode_base64(&frames[0].data).unwrap();
        assert_eq!(pcm.len(), 4096 * 2);

        // 3192 more completes exactly one further frame
        let frames = p.push_samples(&vec![0.25f32; 3192]);
        assert_eq!(frames.len(), 1);
        assert!(p.flush().is_none());
    }

    #[test]
    fn test_frame_format_descriptor() {
        let mut p = pipeline(16_000);
        let frames = p.push_samples(&vec![0.0f32; 4096]);
        assert_eq!(frames[0].mime_type, "audio/pcm;rate=16000");
    }

    #[test]
    fn test_resampling_halves_48k_to_16k() {
        let mut p = pipeline(48_000);
        // 12288 samples at 48kHz resample to 4096 at 16kHz: exactly one frame
        let frames = p.push_samples(&vec![0.1f32; 12_288]);
        assert_eq!(frames.len(), 1);
        assert!(p.flush().is_none());
    }

    #[test]
    fn test_flush_emits_partial_frame() {
        let mut p = pipeline(16_000);
        assert!(p.push_samples(&vec![0.5f32; 100]).is_empty());

        let tail = p.flush().expect("pending samples should flush");
        let pcm = codec::decode_base64(&tail.data).unwrap();
        assert_eq!(pcm.len(), 100 * 2);

        // Flushing again yields nothing
        assert!(p.flush().is_none());
    }

    #[test]
    fn test_close_is_idempotent_and_drops_input() {
        let mut p = pipeline(16_000);
        p.push_samples(&vec![0.5f32; 100]);
        p.close();
        p.close();
        assert!(p.is_closed());
        assert!(p.push_samples(&vec![0.5f32; 4096]).is_empty());
        assert!(p.flush().is_none());
    }
}
