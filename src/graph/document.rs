use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Entity mention attached to a document by an upstream annotator.
///
/// Every member is optional on the wire; [`MentionSet::collect`] decides which
/// mentions are usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Document the mention belongs to
    #[serde(default)]
    pub document_id: Option<String>,
    /// Raw surface-form identifier from the annotator
    #[serde(default)]
    pub entity_id: Option<String>,
    /// Surface text of the mention
    #[serde(default)]
    pub name: Option<String>,
    /// Semantic type (Gene, Disease, Chemical, ...)
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
    /// Vocabulary-normalized identifier (e.g. MeSH)
    #[serde(default)]
    pub standardized_id: Option<String>,
    /// Preferred vocabulary name for the standardized id
    #[serde(default)]
    pub standardized_name: Option<String>,
}

/// Expert-curated relation between two entity identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedRelation {
    pub entity1: String,
    pub entity2: String,
    pub relation_type: String,
}

/// Annotated article (title, abstract, entity mentions, curated relations).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub relations: Vec<CuratedRelation>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn with_relation(
        mut self,
        entity1: impl Into<String>,
        entity2: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        self.relations.push(CuratedRelation {
            entity1: entity1.into(),
            entity2: entity2.into(),
            relation_type: relation_type.into(),
        });
        self
    }

    /// Abstract text if present and not blank.
    pub fn abstract_body(&self) -> Option<&str> {
        self.abstract_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

impl Annotation {
    /// Convenience constructor for a mention of `document_id`.
    pub fn mention(
        document_id: impl Into<String>,
        name: impl Into<String>,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            document_id: Some(document_id.into()),
            name: Some(name.into()),
            entity_type: Some(entity_type.into()),
            ..Default::default()
        }
    }

    pub fn with_standardized_id(mut self, id: impl Into<String>) -> Self {
        self.standardized_id = Some(id.into());
        self
    }

    pub fn with_standardized_name(mut self, name: impl Into<String>) -> Self {
        self.standardized_name = Some(name.into());
        self
    }

    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }
}

/// Which annotations become graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeScope {
    /// Every valid annotation
    #[default]
    All,
    /// Only annotations carrying a standardized vocabulary id
    Standardized,
}

impl NodeScope {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(NodeScope::All),
            "standardized" | "mesh" | "relation" => Ok(NodeScope::Standardized),
            other => Err(Error::InvalidArgument(format!("unknown node scope '{}'", other))),
        }
    }
}

/// Validated entity of one document, keyed by its graph node id.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMention {
    pub key: String,
    pub document_id: String,
    pub name: String,
    pub semantic_type: String,
    pub standardized_id: String,
}

/// Deduplicated entities of a single document.
#[derive(Debug, Clone, Default)]
pub struct MentionSet {
    mentions: BTreeMap<String, NodeMention>,
}

impl MentionSet {
    /// Validate and deduplicate the annotations of `doc`.
    ///
    /// Mentions without a document id, name or type are logged and skipped.
    pub fn collect(doc: &Document, scope: NodeScope, use_standardized_names: bool) -> Self {
        let mut mentions = BTreeMap::new();

        for annotation in &doc.annotations {
            let Some(document_id) = non_blank(&annotation.document_id) else {
                warn!(document = %doc.id, "Skipping annotation without document id");
                continue;
            };
            if document_id != doc.id {
                warn!(
                    document = %doc.id,
                    annotation_document = document_id,
                    "Annotation belongs to another document, attributing it to the enclosing one"
                );
            }
            let Some(name) = non_blank(&annotation.name) else {
                warn!(document = %doc.id, "Skipping annotation without name");
                continue;
            };
            let Some(semantic_type) = non_blank(&annotation.entity_type) else {
                warn!(document = %doc.id, name, "Skipping annotation without type");
                continue;
            };

            let standardized_id = non_blank(&annotation.standardized_id).unwrap_or_default();
            if scope == NodeScope::Standardized && standardized_id.is_empty() {
                continue;
            }

            let key = node_key(annotation, semantic_type, name);
            let display_name = if use_standardized_names {
                non_blank(&annotation.standardized_name).unwrap_or(name)
            } else {
                name
            };

            mentions.entry(key.clone()).or_insert_with(|| NodeMention {
                key,
                document_id: doc.id.clone(),
                name: display_name.to_string(),
                semantic_type: semantic_type.to_string(),
                standardized_id: standardized_id.to_string(),
            });
        }

        Self { mentions }
    }

    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&NodeMention> {
        self.mentions.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.mentions.contains_key(key)
    }

    /// Node keys in lexical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.mentions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeMention> {
        self.mentions.values()
    }

    /// Node keys of mentions that carry a standardized vocabulary id.
    pub fn standardized_keys(&self) -> Vec<&str> {
        self.mentions
            .values()
            .filter(|m| !m.standardized_id.is_empty())
            .map(|m| m.key.as_str())
            .collect()
    }
}

/// Graph node id for an annotation: standardized id, raw id, or `type:name`.
fn node_key(annotation: &Annotation, semantic_type: &str, name: &str) -> String {
    if let Some(id) = non_blank(&annotation.standardized_id) {
        return id.to_string();
    }
    if let Some(id) = non_blank(&annotation.entity_id) {
        return id.to_string();
    }
    format!("{}:{}", semantic_type, name.to_lowercase())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
