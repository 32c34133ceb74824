//! # Speaking Practice
//!
//! The non-realtime half of the speaking module: cue-card topic generation,
//! the examiner persona for the live session, and transcript evaluation once
//! a session finishes. The live audio session itself lives in `crate::live`.

use crate::error::{AppError, AppResult};
use crate::gemini::GeminiClient;
use crate::practice::types::{SpeakerRole, SpeakingFeedback, TranscriptEntry};
use serde_json::{json, Value};

/// Generate a random Part 2 cue-card topic.
pub async fn generate_topic(client: &GeminiClient) -> AppResult<String> {
    let prompt = "Generate a random IELTS Speaking Part 2 cue card topic, e.g. 'Describe a place you have visited that you would recommend to others'. Return the topic only, no additional text";
    client.generate_text(client.text_model(), prompt).await
}

/// System instruction for the live examiner.
///
/// Parameterized by the candidate's target band, the practice duration, and
/// the Part 2 topic. The persona and timing rules matter: the examiner must
/// fill the whole duration and never talk over the candidate.
pub fn examiner_instruction(level: u8, duration_secs: u64, topic: &str) -> String {
    let minutes = (duration_secs as f64 / 60.0).round() as u64;
    format!(
        r#"You are an expert IELTS speaking examiner named Alex, conducting a simulated test. Your persona is calm, professional, and encouraging. Speak clearly at a moderate pace. The candidate is aiming for a band score of {level}. The total test duration is {minutes} minutes.

**YOUR MOST IMPORTANT RULE: NEVER INTERRUPT THE CANDIDATE.**
Wait for them to finish their sentence completely and pause for at least 2-3 seconds before you start speaking. Patiently waiting is critical for a valid test experience. If they are silent for a long time, you may gently prompt them with "Is there anything else you'd like to add?".

**TIME MANAGEMENT IS CRITICAL:**
Your primary goal is to conduct a realistic test that lasts for the **full {minutes} minutes**. Do not end the test early. You must manage the time to cover all three parts.

**TEST STRUCTURE:**

1.  **PART 1: Introduction & Interview (approx. 40% of total time)**
    *   Begin **immediately** with the introduction. Say: "Good morning/afternoon. My name is Alex. This is a simulated IELTS Speaking test. Can you tell me your full name, please? And what should I call you?".
    *   After they respond, ask 2-3 sets of general questions on familiar topics. Example topics: hometown, work, studies, hobbies, food, weather.
    *   Transition smoothly between topics.

2.  **PART 2: Long Turn (approx. 30% of total time)**
    *   Transition clearly: "Thank you. Now, we'll move on to the second part of the test. I am going to give you a topic and I'd like you to talk about it for one to two minutes."
    *   State the topic clearly. The topic is: **'{topic}'**.
    *   Then say: "Before you start, you have one minute to think about what you are going to say. You can make some notes if you wish. (Pause for 2 seconds). Please start speaking now."
    *   **Listen silently while they speak for 1-2 minutes. DO NOT INTERRUPT.**
    *   When they finish (indicated by a long pause), ask one or two brief, direct follow-up questions related to their answer.

3.  **PART 3: Discussion (Remaining Time)**
    *   Transition again: "Thank you. We've been talking about [topic from part 2], and I'd now like to ask you some more general questions related to this."
    *   Ask more abstract and discussion-based questions related to the Part 2 topic.
    *   **Crucially, you must extend this part to fill the remaining time.** If you run out of initial questions, you are required to generate more related questions on the fly. Broaden the topic. Ask "why" or "what if" questions. Your goal is to keep the conversation going naturally until the timer is almost up.

**CONCLUSION:**
*   **Only when the time is almost up (less than 30 seconds left)**, conclude the test politely. Say: "Alright, that is the end of the speaking test. Thank you very much. Goodbye." Do not say this earlier.

Do not provide any feedback during the test. Start the test now with your introduction."#
    )
}

/// Evaluate a finished session transcript against the candidate's target band.
///
/// The call is retryable: a failure leaves the transcript untouched and the
/// caller may simply invoke it again.
pub async fn evaluate(
    client: &GeminiClient,
    transcript: &[TranscriptEntry],
    level: u8,
) -> AppResult<SpeakingFeedback> {
    if transcript.is_empty() {
        return Err(AppError::ValidationError(
            "Cannot evaluate an empty transcript".to_string(),
        ));
    }

    let dialogue = render_transcript(transcript);
    let prompt = format!(
        r#"You are an expert IELTS speaking examiner. Below is the transcript of a simulated IELTS speaking test. The candidate was aiming for a band score of {level}. Evaluate ONLY the candidate's speech, following the official IELTS speaking band descriptors, with a fair, constructive, and encouraging tone. Provide:
1.  **Overall Band Score**: A single number from 1.0 to 9.0.
2.  For each of the four criteria - **Fluency and Coherence**, **Lexical Resource**, **Grammatical Range and Accuracy**, **Pronunciation** - a band score and a detailed feedback paragraph. Base the pronunciation assessment on what can be inferred from the transcript (hesitations, self-corrections, fragmented sentences).
3.  **Strengths**: A bulleted list of 2-3 key strengths.
4.  **Areas for Improvement**: A bulleted list of 2-3 specific, actionable suggestions.

Transcript:
---
{dialogue}
---

Return the response ONLY in the specified JSON format."#
    );

    client
        .generate_json(client.reasoning_model(), &prompt, evaluation_schema())
        .await
}

/// Render the transcript log as labeled dialogue lines.
fn render_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|entry| match entry.speaker {
            SpeakerRole::Candidate => format!("Candidate: {}", entry.text),
            SpeakerRole::Examiner => format!("Examiner: {}", entry.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn evaluation_schema() -> Value {
    let criterion = json!({
        "type": "OBJECT",
        "properties": {
            "score": { "type": "NUMBER" },
            "feedback": { "type": "STRING" }
        },
        "required": ["score", "feedback"]
    });

    json!({
        "type": "OBJECT",
        "properties": {
            "overallBand": { "type": "NUMBER" },
            "fluencyAndCoherence": criterion.clone(),
            "lexicalResource": criterion.clone(),
            "grammaticalRangeAndAccuracy": criterion.clone(),
            "pronunciation": criterion,
            "strengths": { "type": "ARRAY", "items": { "type": "STRING" } },
            "areasForImprovement": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["overallBand", "fluencyAndCoherence", "lexicalResource", "grammaticalRangeAndAccuracy", "pronunciation", "strengths", "areasForImprovement"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_examiner_instruction_embeds_parameters() {
        let instruction = examiner_instruction(7, 5 * 60, "Describe your hometown");
        assert!(instruction.contains("band score of 7"));
        assert!(instruction.contains("5 minutes"));
        assert!(instruction.contains("'Describe your hometown'"));
        assert!(instruction.contains("NEVER INTERRUPT"));
    }

    #[test]
    fn test_render_transcript_labels_speakers() {
        let transcript = vec![
            TranscriptEntry {
                speaker: SpeakerRole::Examiner,
                text: "What should I call you?".to_string(),
            },
            TranscriptEntry {
                speaker: SpeakerRole::Candidate,
                text: "Please call me Sam.".to_string(),
            },
        ];
        let rendered = render_transcript(&transcript);
        assert_eq!(
            rendered,
            "Examiner: What should I call you?\nCandidate: Please call me Sam."
        );
    }

    #[tokio::test]
    async fn test_evaluate_rejects_empty_transcript() {
        let client = GeminiClient::new(AppConfig::default().gemini);
        let result = evaluate(&client, &[], 7).await;
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }
}
