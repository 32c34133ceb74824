//! # Writing Practice
//!
//! Task 2 essay practice: topic generation, quick mid-essay feedback while
//! the student writes, and the full end-of-practice evaluation.
//!
//! Real-time feedback degrades gracefully - a failed call returns a neutral
//! placeholder so the practice screen keeps working - while the detailed
//! evaluation is a hard failure the student can retry.

use crate::error::{AppError, AppResult};
use crate::gemini::GeminiClient;
use crate::practice::types::{DetailedFeedback, RealtimeFeedback};
use serde_json::{json, Value};
use tracing::error;

/// Shown when topic generation fails so the student can still practice.
pub const FALLBACK_TOPIC: &str =
    "Some people think that schools should stop teaching students to write by hand. Do you agree or disagree?";

/// Generate a random Task 2 writing topic.
///
/// Falls back to a stock topic on any failure.
pub async fn generate_topic(client: &GeminiClient) -> String {
    let prompt =
        "Generate a random IELTS Task 2 writing topic. Return the topic only, no additional text";
    match client.generate_text(client.text_model(), prompt).await {
        Ok(topic) => topic,
        Err(e) => {
            error!("Error generating topic: {}", e);
            FALLBACK_TOPIC.to_string()
        }
    }
}

/// Quick assessment of a partial essay.
///
/// Returns the neutral fallback instead of erroring so the periodic feedback
/// poll never interrupts the practice.
pub async fn realtime_feedback(client: &GeminiClient, essay: &str) -> RealtimeFeedback {
    let prompt = format!(
        r#"You are a supportive and encouraging IELTS writing coach. Analyze the following partial essay and provide a quick, real-time assessment. Your tone should be constructive and motivating. The essay may be incomplete. Based on the text so far, provide:
1. An estimated IELTS band score (a single number, e.g., 6.5). Be fair but not overly harsh, especially for an incomplete essay.
2. A list of specific grammatical errors. For each error, provide the exact incorrect text fragment ("error") and a brief explanation of the mistake ("explanation"). If there are no errors, return an empty array.
3. One single, concise and encouraging improvement hint (max 15 words).

Essay:
---
{}
---

Return the response ONLY in the specified JSON format."#,
        essay
    );

    match client
        .generate_json(client.text_model(), &prompt, realtime_schema())
        .await
    {
        Ok(feedback) => feedback,
        Err(e) => {
            error!("Error getting real-time feedback: {}", e);
            RealtimeFeedback {
                estimated_band: 0.0,
                grammar_errors: Vec::new(),
                hint: "Could not retrieve hint at this time.".to_string(),
            }
        }
    }
}

/// Full evaluation of a finished essay against the official band descriptors.
pub async fn detailed_feedback(
    client: &GeminiClient,
    topic: &str,
    essay: &str,
) -> AppResult<DetailedFeedback> {
    if essay.trim().is_empty() {
        return Err(AppError::ValidationError("Essay cannot be empty".to_string()));
    }

    let prompt = format!(
        r#"You are an expert IELTS writing examiner with a reputation for being fair, constructive, and encouraging. Your goal is to help the student improve. Provide a detailed evaluation of the following essay written on the topic: '{}'.

Essay:
---
{}
---

Your evaluation should be thorough and follow the official IELTS band descriptors, but maintain a positive and supportive tone. Be realistic with your scoring, but avoid being overly strict. Provide the following in your response:
1.  **Overall Band Score**: A single number from 1.0 to 9.0.
2.  **Task Achievement**: A detailed paragraph evaluating how well the writer addressed all parts of the task.
3.  **Coherence and Cohesion**: A detailed paragraph evaluating the organization, paragraphing, and use of linking devices.
4.  **Lexical Resource**: A detailed paragraph evaluating the range and accuracy of vocabulary.
5.  **Grammatical Range and Accuracy**: A detailed paragraph evaluating the range and accuracy of grammatical structures.
6.  **Strengths**: A bulleted list of 2-3 key strengths of the essay. Start with what the writer did well.
7.  **Areas for Improvement**: A bulleted list of 2-3 specific, actionable suggestions for improvement. Frame these as constructive advice rather than criticism.

Return the response ONLY in the specified JSON format."#,
        topic, essay
    );

    client
        .generate_json(client.reasoning_model(), &prompt, detailed_schema())
        .await
}

fn realtime_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "estimatedBand": { "type": "NUMBER", "description": "Estimated IELTS band score." },
            "grammarErrors": {
                "type": "ARRAY",
                "description": "A list of grammatical errors found.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "error": { "type": "STRING", "description": "The exact text fragment of the error." },
                        "explanation": { "type": "STRING", "description": "A brief explanation of the error." }
                    },
                    "required": ["error", "explanation"]
                }
            },
            "hint": { "type": "STRING", "description": "A short improvement hint." }
        },
        "required": ["estimatedBand", "grammarErrors", "hint"]
    })
}

fn detailed_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overallBand": { "type": "NUMBER" },
            "taskAchievement": { "type": "STRING" },
            "coherenceAndCohesion": { "type": "STRING" },
            "lexicalResource": { "type": "STRING" },
            "grammaticalRangeAndAccuracy": { "type": "STRING" },
            "strengths": { "type": "ARRAY", "items": { "type": "STRING" } },
            "areasForImprovement": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["overallBand", "taskAchievement", "coherenceAndCohesion", "lexicalResource", "grammaticalRangeAndAccuracy", "strengths", "areasForImprovement"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_schemas_declare_required_fields() {
        let schema = detailed_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 7);
        assert!(required.contains(&json!("overallBand")));

        let schema = realtime_schema();
        assert!(schema["required"].as_array().unwrap().contains(&json!("hint")));
    }

    #[tokio::test]
    async fn test_detailed_feedback_rejects_empty_essay() {
        let client = GeminiClient::new(AppConfig::default().gemini);
        let result = detailed_feedback(&client, "Topic", "   ").await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }
}
