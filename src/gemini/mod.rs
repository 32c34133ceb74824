//! # Generation Service Module
//!
//! HTTP client for the remote generative-language service. The streaming
//! (live audio) connection lives in `crate::live`; this module covers the
//! request/response half: content generation, grading, and speech synthesis.

pub mod client;

pub use client::GeminiClient;
