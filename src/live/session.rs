//! # Speaking Session State Machine
//!
//! Owns one live practice session end to end: the streaming transport, the
//! capture pipeline, the playback scheduler, the turn/transcript log, the
//! countdown timer, and the final grading call.
//!
//! ## Session Lifecycle:
//! `Connecting → Listening ⇄ Speaking → Finished`, with `Error` reachable
//! from any state. Listening→Speaking fires on the first scheduled audio
//! chunk of an examiner turn; Speaking→Listening fires exactly when the
//! playback scheduler's in-flight set empties.
//!
//! ## Dispatch Model:
//! Everything runs on a single task that selects over four sources: commands
//! from the WebSocket actor, events from the transport, the earliest
//! playback end time, and a one-second countdown tick. No callbacks, no
//! shared mutable state - ordering and cancellation are explicit in the loop.

use crate::audio::capture::{CaptureConfig, CapturePipeline};
use crate::audio::playback::{PlaybackScheduler, ScheduledChunk, SessionClock};
use crate::config::AudioConfig;
use crate::gemini::GeminiClient;
use crate::live::messages::LiveEvent;
use crate::live::transport::{LiveConfig, LiveTransport};
use crate::practice::speaking;
use crate::practice::types::{SpeakerRole, SpeakingSessionRecord, TranscriptEntry};
use crate::storage::{JsonStore, Repository};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Current status of a speaking session, as shown to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Opening the streaming connection
    Connecting,
    /// Capturing the candidate; the examiner is silent
    Listening,
    /// Examiner speech is scheduled or playing
    Speaking,
    /// Practice over; grading and persistence happen here
    Finished,
    /// Transport or setup failure; the session cannot resume
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Listening => "listening",
            SessionStatus::Speaking => "speaking",
            SessionStatus::Finished => "finished",
            SessionStatus::Error => "error",
        }
    }

    /// The transition table. Finished and Error are reachable from anywhere
    /// (except themselves); everything else follows the lifecycle above.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (*self, next) {
            (Error, _) => false,
            (from, Error) => from != Error,
            (Finished, _) => false,
            (from, Finished) => from != Finished,
            (Connecting, Listening) => true,
            (Listening, Speaking) => true,
            (Speaking, Listening) => true,
            _ => false,
        }
    }
}

/// Per-speaker accumulators for the turn currently in progress.
///
/// Fragments append as they stream in; a turn-complete signal flushes each
/// non-empty accumulator as one immutable transcript entry (candidate first,
/// then examiner) and resets both.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    candidate: String,
    examiner: String,
}

impl TurnAccumulator {
    pub fn push_candidate(&mut self, fragment: &str) {
        self.candidate.push_str(fragment);
    }

    pub fn push_examiner(&mut self, fragment: &str) {
        self.examiner.push_str(fragment);
    }

    pub fn flush(&mut self) -> Vec<TranscriptEntry> {
        let mut entries = Vec::new();
        if !self.candidate.trim().is_empty() {
            entries.push(TranscriptEntry {
                speaker: SpeakerRole::Candidate,
                text: self.candidate.trim().to_string(),
            });
        }
        if !self.examiner.trim().is_empty() {
            entries.push(TranscriptEntry {
                speaker: SpeakerRole::Examiner,
                text: self.examiner.trim().to_string(),
            });
        }
        self.candidate.clear();
        self.examiner.clear();
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.candidate.is_empty() && self.examiner.is_empty()
    }
}

/// Commands from the session's controller (the WebSocket actor).
#[derive(Debug)]
pub enum SessionCommand {
    /// Mono float samples from the client's microphone at its device rate
    Samples(Vec<f32>),
    /// Finish the practice and grade the transcript (button or timer)
    Finish,
    /// Tear the session down without grading (screen unmounted)
    Close,
}

/// Events the session emits back to its controller.
#[derive(Debug)]
pub enum SessionEvent {
    Status(SessionStatus),
    Transcript(TranscriptEntry),
    Audio(ScheduledChunk),
    Report(SpeakingSessionRecord),
    Error(String),
}

/// Parameters for one practice session.
#[derive(Debug, Clone)]
pub struct SpeakingSessionConfig {
    /// Target band score (1-9)
    pub level: u8,
    /// Practice duration in seconds
    pub duration_secs: u64,
    /// Part 2 cue-card topic
    pub topic: String,
    /// Sample rate of the client's microphone stream (Hz)
    pub device_sample_rate: u32,
}

/// State for one running session; driven exclusively by [`run_session`].
struct SpeakingSession {
    config: SpeakingSessionConfig,
    status: SessionStatus,
    transcript: Vec<TranscriptEntry>,
    turns: TurnAccumulator,
    capture: CapturePipeline,
    scheduler: PlaybackScheduler<SessionClock>,
    remaining_secs: u64,
    finishing: bool,
    finished: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SpeakingSession {
    fn new(
        config: SpeakingSessionConfig,
        audio: &AudioConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let capture = CapturePipeline::new(CaptureConfig {
            device_sample_rate: config.device_sample_rate,
            capture_sample_rate: audio.capture_sample_rate,
            frame_samples: audio.frame_samples,
        });
        let scheduler = PlaybackScheduler::new(SessionClock::new(), audio.output_sample_rate);
        let remaining_secs = config.duration_secs;

        Self {
            config,
            status: SessionStatus::Connecting,
            transcript: Vec::new(),
            turns: TurnAccumulator::default(),
            capture,
            scheduler,
            remaining_secs,
            finishing: false,
            finished: false,
            events,
        }
    }

    /// Apply a status transition if the table allows it.
    fn set_status(&mut self, next: SessionStatus) {
        if self.status == next {
            return;
        }
        if !self.status.can_transition_to(next) {
            debug!(from = self.status.as_str(), to = next.as_str(), "Transition ignored");
            return;
        }
        self.status = next;
        let _ = self.events.send(SessionEvent::Status(next));
    }

    /// Move to Error and surface the message. Terminal - requires a full
    /// session restart, never a resume.
    fn fail(&mut self, message: String) {
        error!("Session error: {}", message);
        self.set_status(SessionStatus::Error);
        let _ = self.events.send(SessionEvent::Error(message));
    }

    /// Claim the finish action. Returns false when a finish is already in
    /// flight or done, so the timer and the finish button can race safely.
    fn begin_finish(&mut self) -> bool {
        if self.finishing || self.finished {
            return false;
        }
        self.finishing = true;
        true
    }

    /// Handle one transport event. Returns false when the session must stop.
    fn handle_live_event(&mut self, event: LiveEvent) -> bool {
        match event {
            LiveEvent::SetupComplete => {}
            LiveEvent::InputTranscript(text) => self.turns.push_candidate(&text),
            LiveEvent::OutputTranscript(text) => self.turns.push_examiner(&text),
            LiveEvent::TurnComplete => {
                for entry in self.turns.flush() {
                    self.transcript.push(entry.clone());
                    let _ = self.events.send(SessionEvent::Transcript(entry));
                }
            }
            LiveEvent::Audio(pcm) => match self.scheduler.schedule(&pcm) {
                Ok(Some(chunk)) => {
                    self.set_status(SessionStatus::Speaking);
                    let _ = self.events.send(SessionEvent::Audio(chunk));
                }
                Ok(None) => {}
                Err(e) => warn!("Dropping undecodable audio chunk: {}", e),
            },
            LiveEvent::Error(message) => {
                self.fail(message);
                return false;
            }
            LiveEvent::Closed => {
                debug!("Remote side closed the stream");
            }
        }
        true
    }

    /// Drop finished playback buffers; the set emptying means the examiner
    /// stopped speaking.
    fn reap_playback(&mut self) {
        let now = self.scheduler.now();
        if self.scheduler.reap_finished(now) {
            self.set_status(SessionStatus::Listening);
        }
    }

    /// One countdown tick. Returns true when the practice time just elapsed.
    fn tick(&mut self) -> bool {
        if self.remaining_secs == 0 {
            return false;
        }
        self.remaining_secs -= 1;
        self.remaining_secs == 0
    }

    /// Grade the transcript and persist the finalized record.
    ///
    /// Idempotent across the timer and the finish button: only the first
    /// caller past [`Self::begin_finish`] grades and persists. A grading
    /// failure releases the guard so the client can retry with the
    /// transcript intact.
    async fn finish(
        &mut self,
        client: &GeminiClient,
        store: &JsonStore<SpeakingSessionRecord>,
        transport: &LiveTransport,
    ) {
        if !self.begin_finish() {
            return;
        }

        // Let the service flush its tail before we grade.
        if let Some(tail) = self.capture.flush() {
            transport.send_frame(tail);
        }
        transport.send_stream_end();

        self.set_status(SessionStatus::Finished);
        info!(turns = self.transcript.len(), "Grading finished session");

        match speaking::evaluate(client, &self.transcript, self.config.level).await {
            Ok(feedback) => {
                let record = SpeakingSessionRecord {
                    id: Uuid::new_v4(),
                    topic: self.config.topic.clone(),
                    transcript: self.transcript.clone(),
                    feedback,
                    date: Utc::now(),
                };
                match store.append(record.clone()) {
                    Ok(()) => {
                        self.finished = true;
                        let _ = self.events.send(SessionEvent::Report(record));
                    }
                    Err(e) => {
                        error!("Failed to persist session record: {}", e);
                        self.finishing = false;
                        let _ = self.events.send(SessionEvent::Error(
                            "There was an error saving your report. Please try again.".to_string(),
                        ));
                    }
                }
            }
            Err(e) => {
                // Keep the transcript and allow another finish attempt.
                error!("Failed to get speaking evaluation: {}", e);
                self.finishing = false;
                let _ = self.events.send(SessionEvent::Error(
                    "There was an error generating your report. Please try again.".to_string(),
                ));
            }
        }
    }
}

/// Drive one speaking session to completion.
///
/// Consumes commands until the practice finishes, the screen closes, or the
/// transport errors. Teardown always runs, with each release step guarded
/// independently.
pub async fn run_session(
    config: SpeakingSessionConfig,
    live_config: LiveConfig,
    audio: AudioConfig,
    client: Arc<GeminiClient>,
    store: Arc<JsonStore<SpeakingSessionRecord>>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut session = SpeakingSession::new(config, &audio, events.clone());
    let _ = events.send(SessionEvent::Status(SessionStatus::Connecting));

    let (live_tx, mut live_rx) = mpsc::unbounded_channel();
    let transport = match LiveTransport::connect(&live_config, live_tx).await {
        Ok(transport) => transport,
        Err(e) => {
            session.fail(format!("Could not reach the examiner service: {}", e));
            return;
        }
    };

    session.set_status(SessionStatus::Listening);

    // First tick fires after one full second, not immediately.
    let mut countdown = tokio::time::interval_at(
        tokio::time::Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );

    loop {
        let playback_deadline = session.scheduler.next_deadline();
        let playback_now = session.scheduler.now();

        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(SessionCommand::Samples(samples)) => {
                    for frame in session.capture.push_samples(&samples) {
                        transport.send_frame(frame);
                    }
                }
                Some(SessionCommand::Finish) => {
                    session.finish(&client, &store, &transport).await;
                    if session.finished {
                        break;
                    }
                }
                Some(SessionCommand::Close) | None => {
                    debug!("Session controller went away");
                    break;
                }
            },
            event = live_rx.recv() => match event {
                Some(event) => {
                    if !session.handle_live_event(event) {
                        break;
                    }
                }
                None => {
                    debug!("Transport event stream ended");
                    break;
                }
            },
            _ = playback_sleep(playback_deadline, playback_now) => {
                session.reap_playback();
            },
            _ = countdown.tick() => {
                if session.tick() {
                    info!("Practice timer elapsed");
                    session.finish(&client, &store, &transport).await;
                    if session.finished {
                        break;
                    }
                }
            }
        }
    }

    // Teardown order matters: transport first, then capture hardware, and
    // every step must run even if an earlier one misbehaved.
    transport.close();
    session.capture.close();
    info!("Speaking session torn down");
}

/// Sleep until the earliest scheduled buffer ends; never resolves while
/// nothing is in flight.
async fn playback_sleep(deadline: Option<f64>, now: f64) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep(Duration::from_secs_f64((deadline - now).max(0.0))).await
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use SessionStatus::*;

        assert!(Connecting.can_transition_to(Listening));
        assert!(Listening.can_transition_to(Speaking));
        assert!(Speaking.can_transition_to(Listening));

        // Finished and Error are reachable from anywhere
        for from in [Connecting, Listening, Speaking] {
            assert!(from.can_transition_to(Finished));
            assert!(from.can_transition_to(Error));
        }

        // But neither goes anywhere afterwards
        for to in [Connecting, Listening, Speaking, Finished] {
            assert!(!Error.can_transition_to(to));
        }
        assert!(!Finished.can_transition_to(Listening));

        // No skipping straight from Connecting to Speaking
        assert!(!Connecting.can_transition_to(Speaking));
    }

    #[test]
    fn test_turn_accumulator_flush() {
        let mut turns = TurnAccumulator::default();
        turns.push_candidate("Hel");
        turns.push_candidate("lo");

        let entries = turns.flush();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].speaker, SpeakerRole::Candidate);
        assert_eq!(entries[0].text, "Hello");
        assert!(turns.is_empty());
    }

    #[test]
    fn test_turn_flush_orders_candidate_before_examiner() {
        let mut turns = TurnAccumulator::default();
        turns.push_examiner("Good morning.");
        turns.push_candidate("Hi there.");

        let entries = turns.flush();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].speaker, SpeakerRole::Candidate);
        assert_eq!(entries[1].speaker, SpeakerRole::Examiner);
    }

    #[test]
    fn test_turn_flush_skips_blank_accumulators() {
        let mut turns = TurnAccumulator::default();
        turns.push_examiner("   ");
        assert!(turns.flush().is_empty());
        assert!(turns.is_empty());
    }

    fn test_session() -> (SpeakingSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = AudioConfig {
            capture_sample_rate: 16_000,
            output_sample_rate: 24_000,
            frame_samples: 4096,
        };
        let session = SpeakingSession::new(
            SpeakingSessionConfig {
                level: 7,
                duration_secs: 300,
                topic: "Describe your hometown".to_string(),
                device_sample_rate: 48_000,
            },
            &audio,
            tx,
        );
        (session, rx)
    }

    #[test]
    fn test_finish_guard_admits_exactly_one_caller() {
        let (mut session, _rx) = test_session();
        assert!(session.begin_finish());
        // Second trigger (timer racing the button) is refused
        assert!(!session.begin_finish());

        // A failed grading attempt releases the guard for a retry
        session.finishing = false;
        assert!(session.begin_finish());

        // But a completed session refuses forever
        session.finished = true;
        session.finishing = false;
        assert!(!session.begin_finish());
    }

    #[test]
    fn test_first_audio_chunk_moves_listening_to_speaking() {
        let (mut session, mut rx) = test_session();
        session.status = SessionStatus::Listening;

        // 0.5s of examiner speech
        assert!(session.handle_live_event(LiveEvent::Audio(vec![0u8; 24_000])));
        assert_eq!(session.status, SessionStatus::Speaking);
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Status(SessionStatus::Speaking))));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Audio(_))));

        // A second chunk in the same turn changes nothing
        assert!(session.handle_live_event(LiveEvent::Audio(vec![0u8; 24_000])));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Audio(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_playback_drained_returns_to_listening() {
        let (mut session, mut rx) = test_session();
        session.status = SessionStatus::Listening;

        // 1ms of examiner speech, then let the output clock pass its end
        session.handle_live_event(LiveEvent::Audio(vec![0u8; 48]));
        assert_eq!(session.status, SessionStatus::Speaking);

        std::thread::sleep(Duration::from_millis(10));
        session.reap_playback();
        assert_eq!(session.status, SessionStatus::Listening);

        // Status events: Speaking then Listening, with the audio in between
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Status(SessionStatus::Speaking))));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Audio(_))));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Status(SessionStatus::Listening))));
    }

    #[test]
    fn test_turn_complete_emits_transcript_entries() {
        let (mut session, mut rx) = test_session();
        session.status = SessionStatus::Listening;

        session.handle_live_event(LiveEvent::InputTranscript("Hel".to_string()));
        session.handle_live_event(LiveEvent::InputTranscript("lo".to_string()));
        session.handle_live_event(LiveEvent::TurnComplete);

        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript[0].text, "Hello");
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Transcript(_))));
    }

    #[test]
    fn test_transport_error_is_terminal() {
        let (mut session, mut rx) = test_session();
        session.status = SessionStatus::Listening;

        assert!(!session.handle_live_event(LiveEvent::Error("socket reset".to_string())));
        assert_eq!(session.status, SessionStatus::Error);
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Status(SessionStatus::Error))));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Error(_))));
    }

    #[test]
    fn test_countdown_reports_zero_exactly_once() {
        let (mut session, _rx) = test_session();
        session.remaining_secs = 2;

        assert!(!session.tick());
        assert!(session.tick());
        // Further ticks never re-trigger the finish
        assert!(!session.tick());
    }
}
