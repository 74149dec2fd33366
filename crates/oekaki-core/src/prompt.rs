use serde::{Deserialize, Serialize};

use crate::ids::PromptId;

/// A word to draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: PromptId,
    pub word: String,
    pub category: String,
    /// Length in characters, shown to guessers as a hint.
    pub length: usize,
}

impl Prompt {
    pub fn new(id: u32, word: &str, category: &str) -> Self {
        Self {
            id: PromptId(id),
            word: word.to_string(),
            category: category.to_string(),
            length: word.chars().count(),
        }
    }
}

/// What a member is allowed to see of the active prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptView {
    /// Only present for the drawer.
    #[serde(default)]
    pub word: Option<String>,
    pub category: String,
    pub length: usize,
}

impl PromptView {
    pub fn for_viewer(prompt: &Prompt, is_drawer: bool) -> Self {
        Self {
            word: is_drawer.then(|| prompt.word.clone()),
            category: prompt.category.clone(),
            length: prompt.length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_counts_chars_not_bytes() {
        let p = Prompt::new(1, "ねこ", "どうぶつ");
        assert_eq!(p.length, 2);
    }

    #[test]
    fn guessers_do_not_see_the_word() {
        let p = Prompt::new(1, "りんご", "たべもの");
        let drawer = PromptView::for_viewer(&p, true);
        let guesser = PromptView::for_viewer(&p, false);
        assert_eq!(drawer.word.as_deref(), Some("りんご"));
        assert!(guesser.word.is_none());
        assert_eq!(guesser.length, 3);
        assert_eq!(guesser.category, "たべもの");
    }
}
