//! # Audio Processing Module
//!
//! The audio half of the live speaking session, plus the codec the listening
//! module uses to wrap synthesized speech for the browser.
//!
//! ## Key Components:
//! - **Codec**: base64 ↔ bytes, PCM16 ↔ float samples, PCM → WAV container
//! - **Capture Pipeline**: microphone blocks → fixed 4096-sample PCM frames
//! - **Playback Scheduler**: gapless scheduling of streamed examiner speech
//!
//! ## Audio Format Requirements:
//! - **Capture**: 16kHz, 16-bit PCM, mono, little-endian
//! - **Playback**: 24kHz, 16-bit PCM, mono, little-endian
//!
//! Capture and playback run on independent clocks; the only ordering
//! guarantee is the playback scheduler's monotonic cursor.

pub mod capture;   // Microphone frames for the streaming session
pub mod codec;     // PCM/base64/WAV conversions
pub mod playback;  // Output-timeline scheduling
