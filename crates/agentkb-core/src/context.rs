//! Chat-history augmentation of a question.

use crate::models::ChatTurn;

/// Flatten prior chat turns and the new question into one retrieval query.
///
/// With no history (or an empty one) the question is returned unchanged.
/// Otherwise each turn renders as `"{role}: {content}"`, turns are joined by
/// newlines, and the question follows on its own line.
pub fn build_context(question: &str, history: Option<&[ChatTurn]>) -> String {
    let turns = match history {
        Some(turns) if !turns.is_empty() => turns,
        _ => return question.to_string(),
    };

    let rendered: Vec<String> = turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect();
    format!("{}\n{}", rendered.join("\n"), question)
}
