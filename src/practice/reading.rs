//! # Reading Practice
//!
//! Reading test generation and scoring. Every question is multiple-choice
//! against a generated passage, so scoring compares the selected option
//! verbatim (trimmed, case-sensitive) - unlike listening, the candidate never
//! types an answer.

use crate::error::{AppError, AppResult};
use crate::gemini::GeminiClient;
use crate::practice::listening::band_range;
use crate::practice::types::{AnswerResult, ReadingTest, TestReport};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Generate a random reading-passage topic.
pub async fn generate_topic(client: &GeminiClient) -> AppResult<String> {
    let prompt = "Generate a random topic suitable for an IELTS academic reading passage, e.g. the history of a technology or a natural phenomenon. Return the topic only, no additional text";
    client.generate_text(client.text_model(), prompt).await
}

/// Generate a reading test: an academic passage plus multiple-choice
/// questions answerable from the passage alone.
pub async fn generate_test(
    client: &GeminiClient,
    topic: &str,
    difficulty: &str,
    question_count: u32,
) -> AppResult<ReadingTest> {
    if topic.trim().is_empty() {
        return Err(AppError::ValidationError("Topic cannot be empty".to_string()));
    }
    let band = band_range(difficulty)?;

    let prompt = format!(
        r#"You are an IELTS reading test writer. Create an academic reading test about the topic: '{topic}'. The test difficulty should match {band} level.

Write:
1. A "passage": an academic-style text of 400-600 words, split into paragraphs separated by newlines.
2. Exactly {question_count} multiple-choice questions answerable from the passage alone. Each question has 4 short options, and the "answer" field repeats the correct option verbatim. Number question ids from 1.

Return the response ONLY in the specified JSON format."#
    );

    client
        .generate_json(client.text_model(), &prompt, test_schema())
        .await
}

/// Score a submitted answer set against the test's canonical answers.
///
/// Comparison is trimmed but case-sensitive: the candidate picked an option
/// verbatim, so any difference means a different option. Unanswered questions
/// count as an empty, incorrect answer.
pub fn score(test: &ReadingTest, answers: &HashMap<u32, String>) -> TestReport {
    let mut score = 0;
    let results: Vec<AnswerResult> = test
        .questions
        .iter()
        .map(|q| {
            let user_answer = answers.get(&q.id).cloned().unwrap_or_default();
            let is_correct = user_answer.trim() == q.answer.trim();
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
            "passage": { "type": "STRING" },
            "questions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "INTEGER" },
                        "questionText": { "type": "STRING" },
                        "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "answer": { "type": "STRING" }
                    },
                    "required": ["id", "questionText", "options", "answer"]
                }
            }
        },
        "required": ["topic", "passage", "questions"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::practice::types::ReadingQuestion;

    fn sample_test() -> ReadingTest {
        ReadingTest {
            topic: "The history of glass".to_string(),
            passage: "Glassmaking began...\nModern glass...".to_string(),
            questions: vec![
                ReadingQuestion {
                    id: 1,
                    question_text: "Where did glassmaking begin?".to_string(),
                    options: vec!["Mesopotamia".to_string(), "Rome".to_string()],
                    answer: "Mesopotamia".to_string(),
                },
                ReadingQuestion {
                    id: 2,
                    question_text: "What made float glass possible?".to_string(),
                    options: vec!["Tin baths".to_string(), "Sand molds".to_string()],
                    answer: "Tin baths".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_empty_submission_scores_zero() {
        let test = sample_test();
        let report = score(&test, &HashMap::new());

        assert_eq!(report.score, 0);
        assert_eq!(report.total_questions, 2);
        for result in &report.results {
            assert_eq!(result.user_answer, "");
            assert!(!result.is_correct);
        }
    }

    #[test]
    fn test_option_comparison_is_case_sensitive() {
        let test = sample_test();
        let mut answers = HashMap::new();
        answers.insert(1, "mesopotamia".to_string());
        answers.insert(2, "Tin baths".to_string());

        let report = score(&test, &answers);
        assert_eq!(report.score, 1);
        assert!(!report.results[0].is_correct);
        assert!(report.results[1].is_correct);
    }
}
