//! System prompts.
//!
//! Built-in copies are compiled from `prompts/`; a file with the same name in a
//! `prompts/` directory next to the working directory overrides them at runtime.

use std::path::PathBuf;

use tracing::debug;

use crate::{Error, Result};

/// Available prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// System message for semantic relation extraction.
    RelationExtraction,
    /// System message for the hybrid chat assistant.
    ChatAssistant,
}

impl Prompt {
    /// Prompt file name (Markdown).
    pub fn filename(&self) -> &'static str {
        match self {
            Prompt::RelationExtraction => "relation_extraction.md",
            Prompt::ChatAssistant => "chat_assistant.md",
        }
    }

    /// Text compiled into the binary.
    pub fn builtin(&self) -> &'static str {
        match self {
            Prompt::RelationExtraction => include_str!("../prompts/relation_extraction.md"),
            Prompt::ChatAssistant => include_str!("../prompts/chat_assistant.md"),
        }
    }

    /// Load the prompt from the prompts directory.
    pub fn load(&self) -> Result<String> {
        load_prompt(self.filename())
    }

    /// On-disk override if present, otherwise the built-in text.
    pub fn text(&self) -> String {
        match self.load() {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                debug!(prompt = self.filename(), "Using built-in prompt");
                self.builtin().trim().to_string()
            }
        }
    }
}

/// Load a prompt by file name.
pub fn load_prompt(filename: &str) -> Result<String> {
    let path = prompts_dir().join(filename);
    std::fs::read_to_string(&path).map_err(|e| {
        Error::Configuration(format!("Failed to load prompt {}: {}", filename, e))
    })
}

/// Directory holding prompt overrides.
pub fn prompts_dir() -> PathBuf {
    let candidates = [
        PathBuf::from("prompts"),
        PathBuf::from("../prompts"),
        PathBuf::from("../../prompts"),
    ];

    for path in candidates {
        if path.exists() {
            return path;
        }
    }

    PathBuf::from("prompts")
}

pub fn list_prompts() -> Vec<Prompt> {
    vec![Prompt::RelationExtraction, Prompt::ChatAssistant]
}
