//! Memory window: earlier Q&A pairs replayed as conversation turns

use crate::domain::QaPair;
use crate::llm::Message;

/// Conversation turns for the chunk at `current`
///
/// The most recent `memory_size` pairs with a lower index, oldest first, each
/// as a user turn (original) and an assistant turn (answer). Error-marker
/// pairs count toward the window like any other recorded chunk.
pub fn memory_turns(pairs: &[QaPair], current: usize, memory_size: usize) -> Vec<Message> {
    if memory_size == 0 {
        return Vec::new();
    }

    let mut window: Vec<&QaPair> = pairs
        .iter()
        .rev()
        .filter(|qa| qa.chunk_index < current)
        .take(memory_size)
        .collect();
    window.sort_by_key(|qa| qa.chunk_index);

    window
        .into_iter()
        .flat_map(|qa| [Message::user(qa.question.clone()), Message::assistant(qa.answer.clone())])
        .collect()
}
