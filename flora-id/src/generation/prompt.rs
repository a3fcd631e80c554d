//! Prompt construction for the generation chain

use crate::types::GenerationRequest;

/// Assistant framing shared by identify and chat requests
pub const SYSTEM_PROMPT: &str = "You are an experienced botanist helping people identify plants. \
Answer clearly and accurately, in the language the user writes in. \
Base identifications only on the candidates provided, mention uncertainty when \
confidence is low, and never invent species that are not listed.";

/// Messages that simply ask "what is this plant?"
const IDENTIFY_KEYWORDS: &[&str] = &["identify", "what is", "what is this", "tanı", "nedir", "bu ne"];

/// True when `message` carries no question beyond a bare identify request
pub fn is_identify_request(message: &str) -> bool {
    let normalized = message.trim().to_lowercase();
    normalized.is_empty() || IDENTIFY_KEYWORDS.contains(&normalized.as_str())
}

/// Request for an image identification with the rendered candidate context
pub fn identification_request(message: &str, context: &str) -> GenerationRequest {
    let user_prompt = if is_identify_request(message) {
        format!(
            "The photo was analysed by several plant identification sources.\n\n\
             {context}\n\n\
             Name the candidate with the highest weighted score as the main result \
             and explain why. Then describe each candidate briefly: its key features, \
             native range and care tips where relevant."
        )
    } else {
        format!(
            "The photo was analysed by several plant identification sources.\n\n\
             {context}\n\n\
             The user asks: \"{}\"\n\n\
             Answer the question using the candidates above.",
            message.trim()
        )
    };

    GenerationRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        user_prompt,
        context: context.to_string(),
    }
}

/// Text-only request without plant context
pub fn chat_request(message: &str) -> GenerationRequest {
    GenerationRequest {
        system_prompt: SYSTEM_PROMPT.to_string(),
        user_prompt: message.trim().to_string(),
        context: String::new(),
    }
}
