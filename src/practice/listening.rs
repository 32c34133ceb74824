//! # Listening Practice
//!
//! Listening test generation and scoring. The service writes a narration
//! script plus questions; the script is synthesized to speech separately and
//! played exactly once in the browser. Scoring happens locally against the
//! test's canonical answers - case-insensitively, because candidates type
//! free-form answers for the fill-in-the-blank questions.

use crate::error::{AppError, AppResult};
use crate::gemini::GeminiClient;
use crate::practice::types::{AnswerResult, ListeningTest, TestReport};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Difficulty labels offered by the setup screen, mapped to band ranges.
pub fn band_range(difficulty: &str) -> AppResult<&'static str> {
    match difficulty {
        "Easy" => Ok("Band 5-6"),
        "Medium" => Ok("Band 6.5-7.5"),
        "Hard" => Ok("Band 8-9"),
        other => Err(AppError::ValidationError(format!(
            "Unknown difficulty: {}",
            other
        ))),
    }
}

/// Generate a random listening-test topic.
pub async fn generate_topic(client: &GeminiClient) -> AppResult<String> {
    let prompt = "Generate a random topic suitable for an IELTS listening test recording, e.g. a conversation about booking accommodation or a short lecture. Return the topic only, no additional text";
    client.generate_text(client.text_model(), prompt).await
}

/// Generate a complete listening test for a topic.
///
/// The audio script should take roughly two minutes to read aloud; questions
/// mix multiple-choice and fill-in-the-blank, each answerable from the
/// script alone.
pub async fn generate_test(
    client: &GeminiClient,
    topic: &str,
    difficulty: &str,
    question_count: u32,
) -> AppResult<ListeningTest> {
    if topic.trim().is_empty() {
        return Err(AppError::ValidationError("Topic cannot be empty".to_string()));
    }
    let band = band_range(difficulty)?;

    let prompt = format!(
        r#"You are an IELTS listening test writer. Create a listening test about the topic: '{topic}'. The test difficulty should match {band} level.

Write:
1. An "audioScript": a natural spoken-English monologue or dialogue of 250-350 words that a narrator will read aloud. Do not include stage directions or speaker labels that would sound odd when read.
2. Exactly {question_count} questions answerable from the script alone. Mix "multiple-choice" questions (with 3-4 short options) and "fill-in-the-blank" questions (answer of 1-3 words exactly as spoken in the script). Number question ids from 1.

Return the response ONLY in the specified JSON format."#
    );

    client
        .generate_json(client.text_model(), &prompt, test_schema())
        .await
}

/// Score a submitted answer set against the test's canonical answers.
///
/// Comparison is whitespace-trimmed and case-insensitive. Unanswered
/// questions count as an empty, incorrect answer.
pub fn score(test: &ListeningTest, answers: &HashMap<u32, String>) -> TestReport {
    let mut score = 0;
    let results: Vec<AnswerResult> = test
        .questions
        .iter()
        .map(|q| {
            let user_answer = answers.get(&q.id).cloned().unwrap_or_default();
            let is_correct =
                user_answer.trim().to_lowercase() == q.answer.trim().to_lowercase();
            if is_correct {
                score += 1;
            }
            AnswerResult {
                question_id: q.id,
                question_text: q.question_text.clone(),
                user_answer,
                correct_answer: q.answer.clone(),
                is_correct,
            }
        })
        .collect();

    TestReport {
        score,
        total_questions: test.questions.len() as u32,
        results,
    }
}

fn test_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "topic": { "type": "STRING" },
            "audioScript": { "type": "STRING" },
            "questions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "INTEGER" },
                        "questionText": { "type": "STRING" },
                        "type": { "type": "STRING", "enum": ["multiple-choice", "fill-in-the-blank"] },
                        "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "answer": { "type": "STRING" }
                    },
                    "required": ["id", "questionText", "type", "answer"]
                }
            }
        },
        "required": ["topic", "audioScript", "questions"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::practice::types::{ListeningQuestion, QuestionType};

    fn sample_test() -> ListeningTest {
        ListeningTest {
            topic: "Campus tour".to_string(),
            audio_script: "Welcome to the campus...".to_string(),
            questions: vec![
                ListeningQuestion {
                    id: 1,
                    question_text: "Where does the tour start?".to_string(),
                    question_type: QuestionType::MultipleChoice,
                    options: Some(vec!["Library".to_string(), "Main gate".to_string()]),
                    answer: "Main gate".to_string(),
                },
                ListeningQuestion {
                    id: 2,
                    question_text: "The cafeteria closes at ___.".to_string(),
                    question_type: QuestionType::FillInTheBlank,
                    options: None,
                    answer: "9 pm".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_all_correct_answers_score_total() {
        let test = sample_test();
        let mut answers = HashMap::new();
        // Case differences must not matter
        answers.insert(1, "main gate".to_string());
        answers.insert(2, " 9 PM ".to_string());

        let report = score(&test, &answers);
        assert_eq!(report.score, report.total_questions);
        assert!(report.results.iter().all(|r| r.is_correct));
    }

    #[test]
    fn test_unanswered_questions_are_incorrect() {
        let test = sample_test();
        let mut answers = HashMap::new();
        answers.insert(1, "Main gate".to_string());

        let report = score(&test, &answers);
        assert_eq!(report.score, 1);
        let missed = &report.results[1];
        assert_eq!(missed.user_answer, "");
        assert!(!missed.is_correct);
        assert_eq!(missed.correct_answer, "9 pm");
    }

    #[test]
    fn test_band_range_mapping() {
        assert_eq!(band_range("Easy").unwrap(), "Band 5-6");
        assert_eq!(band_range("Medium").unwrap(), "Band 6.5-7.5");
        assert_eq!(band_range("Hard").unwrap(), "Band 8-9");
        assert!(band_range("Impossible").is_err());
    }
}
