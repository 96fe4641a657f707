//! Hybrid chat over a finalized graph
//!
//! Each [`HybridChatSession`] owns its own history and collaborators; answers
//! are grounded in two contexts per turn: abstracts ranked by a
//! [`DocumentContext`] and a structural summary from the [`GraphRetriever`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::graph::retriever::DEFAULT_MAX_HOPS;
use crate::graph::{GraphRetriever, GraphStore};
use crate::integrations::{ChatMessage, ChatModel, CompletionRequest};
use crate::prompts::Prompt;
use crate::Result;

pub const NO_RELEVANT_ABSTRACTS: &str = "No relevant abstracts found.";
const EMBEDDING_DIM: usize = 512;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "does", "for", "from", "how", "in", "is",
    "it", "of", "on", "or", "that", "the", "this", "to", "was", "were", "what", "which", "with",
];

/// Chat session settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_history: usize,
    /// Abstracts retrieved per turn
    pub top_k: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            top_k: 5,
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

/// Source of document context for a question (vector index seam).
pub trait DocumentContext: Send + Sync {
    /// Formatted context text and the ids of the documents it contains.
    fn context<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
    ) -> BoxFuture<'a, Result<(String, Vec<String>)>>;

    /// Number of indexed documents.
    fn document_count(&self) -> usize;
}

#[derive(Debug, Clone)]
struct IndexedAbstract {
    id: String,
    title: String,
    abstract_text: String,
    embedding: Vec<f32>,
}

/// In-process abstract index using hashed bag-of-words embeddings.
#[derive(Debug, Clone, Default)]
pub struct LocalAbstractIndex {
    entries: Vec<IndexedAbstract>,
}

impl LocalAbstractIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every document recorded in the graph metadata.
    pub fn from_graph(graph: &GraphStore) -> Self {
        let metadata = &graph.metadata;
        let mut index = Self::new();

        let mut ids: Vec<&String> = metadata
            .document_titles
            .keys()
            .chain(metadata.document_abstracts.keys())
            .collect();
        ids.sort();
        ids.dedup();

        for id in ids {
            let title = metadata.document_titles.get(id).map(String::as_str).unwrap_or("");
            let abstract_text = metadata
                .document_abstracts
                .get(id)
                .map(String::as_str)
                .unwrap_or("");
            index.add(id, title, abstract_text);
        }

        info!(documents = index.len(), "Indexed abstracts for chat");
        index
    }

    /// Add or replace one document. Documents without any text are skipped.
    pub fn add(&mut self, id: &str, title: &str, abstract_text: &str) {
        if title.trim().is_empty() && abstract_text.trim().is_empty() {
            debug!(document = id, "Skipping document without text");
            return;
        }

        let embedding = embed(&format!("{}\n\n{}", title, abstract_text));
        self.entries.retain(|e| e.id != id);
        self.entries.push(IndexedAbstract {
            id: id.to_string(),
            title: title.to_string(),
            abstract_text: abstract_text.to_string(),
            embedding,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn document_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }

    /// Top `top_k` documents by cosine similarity; zero-similarity documents are dropped.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        let query_embedding = embed(query);

        let mut scored: Vec<(&IndexedAbstract, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(&query_embedding, &entry.embedding)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(entry, score)| (entry.id.clone(), score))
            .collect()
    }

    /// Formatted context for the top matches.
    pub fn context_for(&self, query: &str, top_k: usize) -> (String, Vec<String>) {
        let results = self.search(query, top_k);
        if results.is_empty() {
            return (NO_RELEVANT_ABSTRACTS.to_string(), Vec::new());
        }

        let mut parts = Vec::with_capacity(results.len());
        let mut ids = Vec::with_capacity(results.len());
        for (id, score) in results {
            let Some(entry) = self.entries.iter().find(|e| e.id == id) else {
                continue;
            };
            parts.push(format!(
                "PMID: {} (Relevance: {:.2})\nTitle: {}\nAbstract: {}\n",
                id, score, entry.title, entry.abstract_text
            ));
            ids.push(id);
        }

        debug!(documents = ids.len(), "Retrieved abstract context");
        (parts.join("\n---\n\n"), ids)
    }
}

impl DocumentContext for LocalAbstractIndex {
    fn context<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
    ) -> BoxFuture<'a, Result<(String, Vec<String>)>> {
        Box::pin(async move { Ok(self.context_for(query, top_k)) })
    }

    fn document_count(&self) -> usize {
        self.len()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn embed(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; EMBEDDING_DIM];
    for token in tokens(text) {
        let idx = (fnv1a(token.as_bytes()) as usize) % EMBEDDING_DIM;
        vec[idx] += 1.0;
    }
    normalize(&mut vec);
    vec
}

// Stable across processes, unlike the std hasher.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
    })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    /// Document ids backing an assistant answer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    fn new(role: ChatRole, content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
        }
    }

    fn to_message(&self) -> ChatMessage {
        match self.role {
            ChatRole::User => ChatMessage::user(self.content.clone()),
            ChatRole::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

/// Answer to one question.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub message: String,
    pub sources: Vec<String>,
    /// Graph entities recognized in the question
    pub entities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChatStats {
    pub message_count: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub indexed_documents: usize,
}

/// Conversation grounded in abstracts and graph structure.
pub struct HybridChatSession {
    model: Arc<dyn ChatModel>,
    documents: Arc<dyn DocumentContext>,
    retriever: Option<GraphRetriever>,
    config: ChatConfig,
    max_hops: usize,
    system_prompt: String,
    history: Vec<ChatTurn>,
}

impl HybridChatSession {
    pub fn new(
        model: Arc<dyn ChatModel>,
        documents: Arc<dyn DocumentContext>,
        config: ChatConfig,
    ) -> Self {
        Self {
            model,
            documents,
            retriever: None,
            config,
            max_hops: DEFAULT_MAX_HOPS,
            system_prompt: Prompt::ChatAssistant.text(),
            history: Vec::new(),
        }
    }

    /// Session over a finalized graph, indexing its abstracts locally.
    pub fn for_graph(
        model: Arc<dyn ChatModel>,
        graph: Arc<GraphStore>,
        config: ChatConfig,
    ) -> Self {
        let index = LocalAbstractIndex::from_graph(&graph);
        Self::new(model, Arc::new(index), config).with_retriever(GraphRetriever::new(graph))
    }

    pub fn with_retriever(mut self, retriever: GraphRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Answer `query` with the top `top_k` abstracts as context.
    ///
    /// History is only extended when the model call succeeds.
    pub async fn send_message(&mut self, query: &str, top_k: usize) -> Result<ChatReply> {
        let (document_context, sources) = self.documents.context(query, top_k).await?;
        let (entities, graph_context) = self.graph_context(query);

        let mut messages: Vec<ChatMessage> = self
            .recent_history()
            .iter()
            .map(ChatTurn::to_message)
            .collect();
        messages.push(ChatMessage::user(compose_user_turn(
            query,
            &document_context,
            graph_context.as_deref(),
        )));

        info!(
            documents = sources.len(),
            entities = entities.len(),
            "Sending chat request"
        );

        let request = CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let answer = match self.model.complete(request).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Chat request failed");
                return Err(e);
            }
        };

        self.history.push(ChatTurn::new(ChatRole::User, query, Vec::new()));
        self.history
            .push(ChatTurn::new(ChatRole::Assistant, answer.clone(), sources.clone()));
        self.trim_history();

        Ok(ChatReply {
            message: answer,
            sources,
            entities,
        })
    }

    fn graph_context(&self, query: &str) -> (Vec<String>, Option<String>) {
        let Some(retriever) = &self.retriever else {
            return (Vec::new(), None);
        };

        let entities = retriever.find_relevant_nodes(query);
        if entities.is_empty() {
            return (entities, None);
        }

        let context = retriever.get_subgraph_context(&entities, self.max_hops);
        (entities, Some(context))
    }

    fn recent_history(&self) -> &[ChatTurn] {
        let keep = self.config.max_history.saturating_sub(1);
        let start = self.history.len().saturating_sub(keep);
        &self.history[start..]
    }

    fn trim_history(&mut self) {
        if self.history.len() > self.config.max_history {
            let excess = self.history.len() - self.config.max_history;
            self.history.drain(..excess);
            debug!(max = self.config.max_history, "Trimmed chat history");
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
        info!("Chat history cleared");
    }

    pub fn stats(&self) -> ChatStats {
        ChatStats {
            message_count: self.history.len(),
            user_messages: self.history.iter().filter(|t| t.role == ChatRole::User).count(),
            assistant_messages: self
                .history
                .iter()
                .filter(|t| t.role == ChatRole::Assistant)
                .count(),
            indexed_documents: self.documents.document_count(),
        }
    }
}

fn compose_user_turn(query: &str, documents: &str, graph: Option<&str>) -> String {
    let mut turn = String::new();
    if let Some(graph) = graph {
        turn.push_str(&format!("Knowledge graph context:\n\n{}\n\n---\n\n", graph));
    }
    turn.push_str(&format!(
        "Context (relevant abstracts):\n\n{}\n\n---\n\nUser question: {}\n\nPlease answer based on the context provided above.",
        documents, query
    ));
    turn
}
