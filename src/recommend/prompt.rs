//! Prompt construction for the recommend path.

use serde::Serialize;

use crate::completion::ChatPrompt;
use crate::models::Candidate;

pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 25;

const SYSTEM_PROMPT: &str = "\
You are a course advisor. Recommend courses for the user's intent using ONLY \
the candidate courses provided in the user message. Never mention, invent or \
modify a course_id that is not in the candidate list.

Respond with a JSON object of exactly this shape:
{\"recommendations\": [{\"course_id\": \"<candidate id>\", \"rationale\": \"<at most two sentences>\", \"confidence\": <number between 0.0 and 1.0>}]}

Order recommendations from best to worst and return at most top_k items. \
If no candidate fits, or you are uncertain, return {\"recommendations\": []}.";

/// Clamp a requested `top_k` into `[MIN_TOP_K, MAX_TOP_K]`.
pub fn clamp_top_k(requested: i64) -> usize {
    requested.clamp(MIN_TOP_K as i64, MAX_TOP_K as i64) as usize
}

#[derive(Serialize)]
struct UserContent<'a> {
    intent: &'a str,
    top_k: usize,
    candidates: &'a [Candidate],
}

/// Build the two-message prompt for `intent` over `candidates`.
///
/// The caller is responsible for truncating `candidates`; every candidate
/// passed here is shown to the model.
pub fn build_prompt(intent: &str, candidates: &[Candidate], top_k: usize) -> ChatPrompt {
    let content = UserContent {
        intent: intent.trim(),
        top_k,
        candidates,
    };
    // Serializing plain strings and numbers cannot fail.
    let user = serde_json::to_string_pretty(&content).unwrap_or_default();

    ChatPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}
