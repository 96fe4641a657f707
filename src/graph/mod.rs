//! Biomedical entity-relation graph.
//!
//! Annotated documents become a weighted entity graph:
//! - nodes are entities, merged across documents by vocabulary id
//! - edges come from co-occurrence, expert-curated relations, or relations
//!   extracted by a language model
//! - edges are weighted by frequency or NPMI, pruned, laid out and optionally
//!   clustered into communities
//! - [`GraphRetriever`] turns a finalized graph into text context for chat

pub mod builder;
pub mod community;
pub mod document;
pub mod layout;
pub mod npmi;
pub mod relation_types;
pub mod retriever;
pub mod semantic;
pub mod store;

pub use builder::{BuildOptions, EdgeMethod, GraphBuilder, CO_MENTION};
pub use document::{Annotation, CuratedRelation, Document, MentionSet, NodeMention, NodeScope};
pub use npmi::npmi;
pub use retriever::GraphRetriever;
pub use semantic::{ExtractorConfig, ProgressEvent, SemanticEdge, SemanticRelationExtractor};
pub use store::{
    CommunityEdge, CommunityNode, CommunityView, DocumentWeights, EdgeCutoff, EdgeDocument,
    EdgeUpdate, FilterOptions, GraphEdge, GraphMetadata, GraphNode, GraphStore, Position,
    WeightingMethod,
};
