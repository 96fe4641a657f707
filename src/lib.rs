//! Biomedical Entity-Relation Graph Library
//!
//! This library provides tools to:
//! - Turn annotated PubMed-style documents into a weighted entity graph
//! - Generate edges from co-occurrence, curated relations or LLM extraction
//! - Weight edges by frequency or NPMI, prune, lay out and cluster them
//! - Persist and re-filter graph snapshots
//! - Answer questions with graph structure plus relevant abstracts

pub mod chat;
pub mod config;
pub mod error;
pub mod graph;
pub mod integrations;
pub mod metrics;
pub mod prompts;

// Re-export common types
pub use chat::{ChatConfig, DocumentContext, HybridChatSession, LocalAbstractIndex};
pub use config::Config;
pub use error::{Error, Result};
pub use graph::{
    BuildOptions, Document, EdgeMethod, GraphBuilder, GraphRetriever, GraphStore,
    SemanticRelationExtractor,
};
pub use integrations::{ChatModel, CompletionRequest, OpenAIClient};
pub use prompts::{load_prompt, Prompt};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
