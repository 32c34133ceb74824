//! # Practice Data Model
//!
//! Shared types for the four practice modules. Everything here is either a
//! payload exchanged with the remote generation service (field names follow
//! its camelCase JSON schemas) or a finalized session record - created once
//! at the end of a practice flow, immutable thereafter, and persisted to the
//! module's history store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Transcript ─────────────────────────────────────────────────────

/// Who produced a span of speech in a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// The practicing student
    Candidate,
    /// The simulated examiner
    Examiner,
}

/// One completed turn of speech. Appended to the transcript log only when a
/// turn boundary is signaled; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: SpeakerRole,
    pub text: String,
}

// ── Writing ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarError {
    pub error: String,
    pub explanation: String,
}

/// Quick mid-essay assessment shown while the student is still writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeFeedback {
    pub estimated_band: f64,
    pub grammar_errors: Vec<GrammarError>,
    pub hint: String,
}

/// Full end-of-practice evaluation following the official band descriptors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedFeedback {
    pub overall_band: f64,
    pub task_achievement: String,
    pub coherence_and_cohesion: String,
    pub lexical_resource: String,
    pub grammatical_range_and_accuracy: String,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
}

/// A finalized writing attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Essay {
    pub id: Uuid,
    pub topic: String,
    pub content: String,
    pub feedback: DetailedFeedback,
    pub date: DateTime<Utc>,
}

// ── Speaking ───────────────────────────────────────────────────────

/// Band score plus commentary for one assessment criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingFeedback {
    pub overall_band: f64,
    pub fluency_and_coherence: CriterionScore,
    pub lexical_resource: CriterionScore,
    pub grammatical_range_and_accuracy: CriterionScore,
    pub pronunciation: CriterionScore,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
}

/// A finalized speaking session: the full transcript plus its evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakingSessionRecord {
    pub id: Uuid,
    pub topic: String,
    pub transcript: Vec<TranscriptEntry>,
    pub feedback: SpeakingFeedback,
    pub date: DateTime<Utc>,
}

// ── Listening ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "multiple-choice")]
    MultipleChoice,
    #[serde(rename = "fill-in-the-blank")]
    FillInTheBlank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningQuestion {
    pub id: u32,
    pub question_text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub answer: String,
}

/// A generated listening test: the narration script the audio is synthesized
/// from, plus its questions and canonical answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningTest {
    pub topic: String,
    pub audio_script: String,
    pub questions: Vec<ListeningQuestion>,
}

// ── Reading ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingQuestion {
    pub id: u32,
    pub question_text: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingTest {
    pub topic: String,
    pub passage: String,
    pub questions: Vec<ReadingQuestion>,
}

// ── Scoring ────────────────────────────────────────────────────────

/// Per-question outcome of a submitted answer set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub question_id: u32,
    pub question_text: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

/// Score summary for a listening or reading submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub score: u32,
    pub total_questions: u32,
    pub results: Vec<AnswerResult>,
}

/// A finalized listening attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListeningSessionRecord {
    pub id: Uuid,
    pub topic: String,
    pub report: TestReport,
    pub date: DateTime<Utc>,
}

/// A finalized reading attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSessionRecord {
    pub id: Uuid,
    pub topic: String,
    pub report: TestReport,
    pub date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_entry_serialization() {
        let entry = TranscriptEntry {
            speaker: SpeakerRole::Candidate,
            text: "Hello".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"speaker\":\"candidate\""));

        let back: TranscriptEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_feedback_uses_service_field_names() {
        let json = r#"{
            "overallBand": 6.5,
            "taskAchievement": "a",
            "coherenceAndCohesion": "b",
            "lexicalResource": "c",
            "grammaticalRangeAndAccuracy": "d",
            "strengths": ["s1"],
            "areasForImprovement": ["i1"]
        }"#;
        let feedback: DetailedFeedback = serde_json::from_str(json).unwrap();
        assert_eq!(feedback.overall_band, 6.5);
        assert_eq!(feedback.strengths, vec!["s1"]);
    }

    #[test]
    fn test_listening_question_type_tags() {
        let json = r#"{
            "id": 1,
            "questionText": "What time does the tour start?",
            "type": "multiple-choice",
            "options": ["9am", "10am"],
            "answer": "9am"
        }"#;
        let q: ListeningQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(q.question_type, QuestionType::MultipleChoice);

        let blank: ListeningQuestion = serde_json::from_str(
            r#"{"id": 2, "questionText": "The library is on ___ street.", "type": "fill-in-the-blank", "answer": "Green"}"#,
        )
        .unwrap();
        assert_eq!(blank.question_type, QuestionType::FillInTheBlank);
        assert!(blank.options.is_none());
    }
}
