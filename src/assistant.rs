//! Assistant reply generation
//!
//! Replies are canned; no inference happens here.

use rand::seq::SliceRandom;

/// Produces the assistant's answer to a user question
pub trait ReplyGenerator: Send {
    fn generate(&self, question: &str) -> String;
}

const CANNED_REPLIES: [&str; 5] = [
    "I can see what appears to be a modern indoor environment. Could you be more specific about what you'd like to know?",
    "Based on the visual input, I notice various objects and lighting. What particular aspect interests you?",
    "I'm analyzing the visual elements in your camera feed. The lighting suggests this is an indoor setting.",
    "I can observe the scene through your camera. What specific information are you looking for?",
    "The camera shows an interesting view. Could you clarify what you'd like me to help you identify or understand?",
];

/// Picks one of a fixed set of replies at random
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedReplies;

impl ReplyGenerator for CannedReplies {
    fn generate(&self, _question: &str) -> String {
        CANNED_REPLIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(CANNED_REPLIES[0])
            .to_string()
    }
}
