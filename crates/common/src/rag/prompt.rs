//! Prompt assembly

use crate::models::{ChatMessage, ConversationHistory};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant with knowledge about the trips and safety of people! You politely answer the questions.";

/// Joins retrieved texts into one context string
pub const CONTEXT_SEPARATOR: &str = " ";

/// Build the message list sent to the chat model.
///
/// Order: system prompt, the context+question turn, then prior history in
/// its original order.
pub fn build_prompt(context: &str, question: &str, history: &ConversationHistory) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.push(ChatMessage::user(format!(
        "Context: {}\n\nQuestion: {}",
        context, question
    )));
    messages.extend(history.iter().map(|turn| turn.as_message()));
    messages
}
