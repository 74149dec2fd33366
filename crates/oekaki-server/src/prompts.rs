use std::collections::HashSet;

use rand::Rng;
use rand::seq::IteratorRandom;
use serde::Deserialize;

use oekaki_core::ids::PromptId;
use oekaki_core::prompt::Prompt;

use crate::config::PromptsConfig;

const BUILTIN: &[(&str, &str)] = &[
    ("ねこ", "どうぶつ"),
    ("いぬ", "どうぶつ"),
    ("うさぎ", "どうぶつ"),
    ("ぱんだ", "どうぶつ"),
    ("きりん", "どうぶつ"),
    ("ぞう", "どうぶつ"),
    ("ぺんぎん", "どうぶつ"),
    ("かめ", "どうぶつ"),
    ("りんご", "たべもの"),
    ("ばなな", "たべもの"),
    ("すし", "たべもの"),
    ("おにぎり", "たべもの"),
    ("らーめん", "たべもの"),
    ("けーき", "たべもの"),
    ("いちご", "たべもの"),
    ("すいか", "たべもの"),
    ("くるま", "のりもの"),
    ("でんしゃ", "のりもの"),
    ("ひこうき", "のりもの"),
    ("じてんしゃ", "のりもの"),
    ("ふね", "のりもの"),
    ("かさ", "どうぐ"),
    ("めがね", "どうぐ"),
    ("とけい", "どうぐ"),
    ("えんぴつ", "どうぐ"),
    ("はさみ", "どうぐ"),
    ("やま", "しぜん"),
    ("うみ", "しぜん"),
    ("にじ", "しぜん"),
    ("たいよう", "しぜん"),
    ("ゆきだるま", "しぜん"),
    ("さくら", "しぜん"),
];

#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompt: Vec<PromptEntry>,
}

#[derive(Debug, Deserialize)]
struct PromptEntry {
    word: String,
    category: String,
}

/// Static word list that rounds draw their prompts from.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: Vec<Prompt>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptCatalog {
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN.iter().map(|(w, c)| (w.to_string(), c.to_string())))
    }

    fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut seen = HashSet::new();
        let prompts = pairs
            .into_iter()
            .filter(|(word, _)| !word.trim().is_empty() && seen.insert(word.trim().to_string()))
            .zip(1u32..)
            .map(|((word, category), id)| Prompt::new(id, word.trim(), category.trim()))
            .collect();
        Self { prompts }
    }

    /// Parse extra prompts in the form `[[prompt]] word = "..." category = "..."`.
    pub fn parse_extra(content: &str) -> Result<Vec<(String, String)>, toml::de::Error> {
        let file: PromptFile = toml::from_str(content)?;
        Ok(file
            .prompt
            .into_iter()
            .map(|e| (e.word, e.category))
            .collect())
    }

    /// Build the catalog described by `config`. An unreadable extra file falls back
    /// to the built-in list.
    pub fn load(config: &PromptsConfig) -> Self {
        let Some(path) = &config.extra_file else {
            return Self::builtin();
        };
        let extra = match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse_extra(&content) {
                Ok(extra) => extra,
                Err(e) => {
                    tracing::warn!(path = %path, "Failed to parse prompts file: {e}");
                    return Self::builtin();
                },
            },
            Err(e) => {
                tracing::warn!(path = %path, "Failed to read prompts file: {e}");
                return Self::builtin();
            },
        };
        let catalog = if config.replace_builtin {
            Self::from_pairs(extra)
        } else {
            Self::from_pairs(
                BUILTIN
                    .iter()
                    .map(|(w, c)| (w.to_string(), c.to_string()))
                    .chain(extra),
            )
        };
        if catalog.is_empty() {
            tracing::warn!(path = %path, "Prompts file is empty, using built-in catalog");
            return Self::builtin();
        }
        tracing::info!(prompts = catalog.len(), "Prompt catalog loaded");
        catalog
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn get(&self, id: PromptId) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    /// Pick a prompt not in `used`, uniformly. `None` once every prompt was used.
    pub fn pick_unused<R: Rng + ?Sized>(
        &self,
        used: &HashSet<PromptId>,
        rng: &mut R,
    ) -> Option<&Prompt> {
        self.prompts
            .iter()
            .filter(|p| !used.contains(&p.id))
            .choose(rng)
    }
}
