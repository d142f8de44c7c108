//! The user-defined type schema: which kinds of discourse nodes exist, which kinds of relations
//! exist, and which (node type, node type) pairs each relation type may connect.
//!
//! The schema is edited by the settings screens of the host plugin and is read-only here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use crate::error::DiscourseError;

/// The placeholder a [NodeType::format] wraps, e.g. `CLM - {content}`.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("static tag pattern compiles"));

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }
    };
}

string_id!(NodeTypeId);
string_id!(RelationTypeId);

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeType {
    pub id: NodeTypeId,
    pub name: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default)]
    pub key_image: bool,
}

impl NodeType {
    /// Splits the format around `{content}` into its (prefix, suffix) pair.
    pub fn format_parts(&self) -> Option<(&str, &str)> {
        let idx = self.format.find(CONTENT_PLACEHOLDER)?;
        Some((
            &self.format[..idx],
            &self.format[idx + CONTENT_PLACEHOLDER.len()..],
        ))
    }

    /// Build a node title from its content.
    pub fn format_title(&self, content: &str) -> String {
        self.format.replacen(CONTENT_PLACEHOLDER, content.trim(), 1)
    }

    /// Extract the content of a title written in this type's format, if it matches.
    pub fn content_of<'a>(&self, title: &'a str) -> Option<&'a str> {
        let (prefix, suffix) = self.format_parts()?;
        let rest = title.strip_prefix(prefix)?;
        let content = rest.strip_suffix(suffix)?;
        let content = content.trim();
        (!content.is_empty()).then_some(content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationType {
    pub id: RelationTypeId,
    pub label: String,
    pub complement: String,
    #[serde(default)]
    pub color: String,
}

/// A schema edge: nodes of type `source_id` may form a `relationship_type_id` relation pointing
/// at nodes of type `destination_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscourseRelation {
    pub source_id: NodeTypeId,
    pub destination_id: NodeTypeId,
    pub relationship_type_id: RelationTypeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    #[serde(default)]
    pub node_types: Vec<NodeType>,
    #[serde(default)]
    pub relation_types: Vec<RelationType>,
    #[serde(default)]
    pub discourse_relations: Vec<DiscourseRelation>,
}

impl TypeSchema {
    /// Read the schema out of the host plugin's JSON settings blob, ignoring unrelated settings.
    pub fn from_json_str(json: &str) -> Result<TypeSchema, DiscourseError> {
        let schema: TypeSchema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn node_type(&self, id: &NodeTypeId) -> Option<&NodeType> {
        self.node_types.iter().find(|nt| &nt.id == id)
    }

    pub fn relation_type(&self, id: &RelationTypeId) -> Option<&RelationType> {
        self.relation_types.iter().find(|rt| &rt.id == id)
    }

    /// Display name of a node type, falling back to its id for unknown types.
    pub fn node_type_name(&self, id: &NodeTypeId) -> String {
        self.node_type(id)
            .map(|nt| nt.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// The first node type whose format matches the title.
    pub fn node_type_for_title(&self, title: &str) -> Option<&NodeType> {
        self.node_types
            .iter()
            .find(|nt| nt.content_of(title).is_some())
    }

    /// Check every invariant the settings screens are expected to uphold.
    pub fn validate(&self) -> Result<(), DiscourseError> {
        let mut ids = BTreeSet::new();
        let mut names = BTreeSet::new();
        let mut formats = BTreeSet::new();
        for nt in self.node_types.iter() {
            if nt.id.as_str().is_empty() {
                return Err(DiscourseError::Schema(format!(
                    "node type '{}' has an empty id",
                    nt.name
                )));
            }
            if !ids.insert(&nt.id) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate node type id '{}'",
                    nt.id
                )));
            }
            if !names.insert(&nt.name) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate node type name '{}'",
                    nt.name
                )));
            }
            if !formats.insert(&nt.format) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate node type format '{}'",
                    nt.format
                )));
            }
            if nt.format.matches(CONTENT_PLACEHOLDER).count() != 1 {
                return Err(DiscourseError::Schema(format!(
                    "format '{}' of node type '{}' must contain {CONTENT_PLACEHOLDER} exactly once",
                    nt.format, nt.name
                )));
            }
            if let Some(tag) = nt.tag.as_ref() {
                if !TAG_PATTERN.is_match(tag) {
                    return Err(DiscourseError::Schema(format!(
                        "tag '{tag}' of node type '{}' may only contain letters, digits and dashes",
                        nt.name
                    )));
                }
            }
        }

        let mut rel_ids = BTreeSet::new();
        let mut labels = BTreeSet::new();
        let mut complements = BTreeSet::new();
        for rt in self.relation_types.iter() {
            if !rel_ids.insert(&rt.id) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate relation type id '{}'",
                    rt.id
                )));
            }
            if !labels.insert(&rt.label) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate relation label '{}'",
                    rt.label
                )));
            }
            if !complements.insert(&rt.complement) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate relation complement '{}'",
                    rt.complement
                )));
            }
        }

        let mut triples = BTreeSet::new();
        for dr in self.discourse_relations.iter() {
            for node_id in [&dr.source_id, &dr.destination_id] {
                if !ids.contains(node_id) {
                    return Err(DiscourseError::Schema(format!(
                        "discourse relation references unknown node type '{node_id}'"
                    )));
                }
            }
            if !rel_ids.contains(&dr.relationship_type_id) {
                return Err(DiscourseError::Schema(format!(
                    "discourse relation references unknown relation type '{}'",
                    dr.relationship_type_id
                )));
            }
            if !triples.insert(dr) {
                return Err(DiscourseError::Schema(format!(
                    "duplicate discourse relation {} -[{}]-> {}",
                    dr.source_id, dr.relationship_type_id, dr.destination_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::claim_evidence_schema;

    #[test]
    fn format_parts_split_around_content() {
        let schema = claim_evidence_schema();
        let claim = schema.node_type(&"claim".into()).unwrap();
        assert_eq!(claim.format_parts(), Some(("CLM - ", "")));
        assert_eq!(claim.format_title(" Sky is blue "), "CLM - Sky is blue");
        assert_eq!(claim.content_of("CLM - Sky is blue"), Some("Sky is blue"));
        assert_eq!(claim.content_of("EVD - Sky is blue"), None);
        assert_eq!(claim.content_of("CLM - "), None);
    }

    #[test]
    fn node_type_for_title_matches_format() {
        let schema = claim_evidence_schema();
        let found = schema.node_type_for_title("EVD - Spectrometer reading");
        assert_eq!(found.map(|nt| nt.name.as_str()), Some("Evidence"));
        assert!(schema.node_type_for_title("plain note").is_none());
    }

    #[test]
    fn validate_rejects_duplicate_triples_and_bad_formats() {
        let mut schema = claim_evidence_schema();
        assert!(schema.validate().is_ok());

        let dup = schema.discourse_relations[0].clone();
        schema.discourse_relations.push(dup);
        assert!(matches!(schema.validate(), Err(DiscourseError::Schema(_))));

        let mut schema = claim_evidence_schema();
        schema.node_types[0].format = "no placeholder".to_string();
        assert!(schema.validate().is_err());

        let mut schema = claim_evidence_schema();
        schema.node_types[0].tag = Some("has space".to_string());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn from_json_reads_host_settings() {
        let json = r##"{
            "nodeTypes": [
                {"id": "q", "name": "Question", "format": "QUE - {content}", "keyImage": true},
                {"id": "c", "name": "Claim", "format": "CLM - {content}", "tag": "clm"}
            ],
            "relationTypes": [
                {"id": "informs", "label": "informs", "complement": "is informed by", "color": "#000"}
            ],
            "discourseRelations": [
                {"sourceId": "c", "destinationId": "q", "relationshipTypeId": "informs"}
            ],
            "showIdsInFrontmatter": false
        }"##;
        let schema = TypeSchema::from_json_str(json).unwrap();
        assert!(schema.node_types[0].key_image);
        assert_eq!(schema.node_types[1].tag.as_deref(), Some("clm"));
        assert_eq!(schema.discourse_relations.len(), 1);
    }
}
