//! Classification of biomedical relation labels.
//!
//! Labels coming back from the extraction model are free text; they are
//! lowercased, spaces become underscores and common verb/noun variants map to
//! one canonical form.

/// Relations where `A rel B` implies a direction.
const DIRECTIONAL: &[&str] = &[
    "inhibits", "activates", "increases", "decreases", "upregulates", "downregulates",
    "regulates", "induces", "suppresses", "represses", "enhances", "promotes",
    "stimulates", "blocks", "phosphorylates", "methylates", "acetylates",
    "ubiquitinates", "modifies", "causes", "leads_to", "results_in", "triggers",
    "treats", "prevents", "cures", "ameliorates", "metabolizes", "synthesizes",
    "degrades", "catalyzes", "expresses", "transcribes", "translates",
];

/// Bidirectional or non-directional relations.
const SYMMETRIC: &[&str] = &[
    "interacts_with",
    "associated_with",
    "co_occurs_with",
    "correlates_with",
    "binds_to",
    "complexes_with",
    "related_to",
    "co-mention",
];

const NORMALIZATIONS: &[(&str, &str)] = &[
    ("inhibit", "inhibits"),
    ("inhibition", "inhibits"),
    ("inhibitor", "inhibits"),
    ("activate", "activates"),
    ("activation", "activates"),
    ("activator", "activates"),
    ("increase", "increases"),
    ("increasing", "increases"),
    ("decrease", "decreases"),
    ("decreasing", "decreases"),
    ("regulate", "regulates"),
    ("regulation", "regulates"),
    ("regulator", "regulates"),
    ("upregulate", "upregulates"),
    ("upregulation", "upregulates"),
    ("downregulate", "downregulates"),
    ("downregulation", "downregulates"),
    ("induce", "induces"),
    ("induction", "induces"),
    ("suppress", "suppresses"),
    ("suppression", "suppresses"),
    ("enhance", "enhances"),
    ("enhancement", "enhances"),
    ("promote", "promotes"),
    ("promotion", "promotes"),
    ("phosphorylate", "phosphorylates"),
    ("phosphorylation", "phosphorylates"),
    ("treat", "treats"),
    ("treatment", "treats"),
    ("cause", "causes"),
    ("interact", "interacts_with"),
    ("interaction", "interacts_with"),
    ("associate", "associated_with"),
    ("association", "associated_with"),
    ("bind", "binds_to"),
    ("binding", "binds_to"),
];

/// Canonical form of a relation label.
pub fn normalize_relation_type(relation: &str) -> String {
    let normalized = relation.trim().to_lowercase().replace(' ', "_");
    NORMALIZATIONS
        .iter()
        .find(|(variant, _)| *variant == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}

pub fn is_directional(relation: &str) -> bool {
    DIRECTIONAL.contains(&normalize_relation_type(relation).as_str())
}

pub fn is_symmetric(relation: &str) -> bool {
    SYMMETRIC.contains(&normalize_relation_type(relation).as_str())
}

/// Human-readable label (`interacts_with` -> `interacts with`).
pub fn display_name(relation: &str) -> String {
    normalize_relation_type(relation).replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_spacing_and_variants() {
        assert_eq!(normalize_relation_type("inhibition"), "inhibits");
        assert_eq!(normalize_relation_type("INHIBITS"), "inhibits");
        assert_eq!(normalize_relation_type(" interacts with "), "interacts_with");
        assert_eq!(normalize_relation_type("Binding"), "binds_to");
        assert_eq!(normalize_relation_type("novel_label"), "novel_label");
    }

    #[test]
    fn classifies_direction() {
        assert!(is_directional("activation"));
        assert!(!is_directional("interacts with"));
        assert!(is_symmetric("co-mention"));
        assert!(is_symmetric("association"));
        assert!(!is_symmetric("treats"));
        assert!(!is_directional("unknown") && !is_symmetric("unknown"));
    }

    #[test]
    fn display_name_uses_spaces() {
        assert_eq!(display_name("interacts_with"), "interacts with");
        assert_eq!(display_name("inhibits"), "inhibits");
    }
}
