//! Relation legality and direction labels.
//!
//! A [DiscourseRelation] row is readable in both directions: `source -[label]-> destination` and
//! `destination -[complement]-> source`. A connection is therefore legal when either the forward
//! or the reverse row exists; only the displayed text depends on which one matched.

use std::collections::BTreeSet;

use crate::schema::{DiscourseRelation, NodeTypeId, RelationTypeId, TypeSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationDirection {
    /// A row with source = start, destination = end exists.
    Forward,
    /// Only a row with source = end, destination = start exists.
    Reverse,
}

fn has_row(
    schema: &TypeSchema,
    source: &NodeTypeId,
    destination: &NodeTypeId,
    relation: &RelationTypeId,
) -> bool {
    schema.discourse_relations.iter().any(|dr: &DiscourseRelation| {
        &dr.source_id == source
            && &dr.destination_id == destination
            && &dr.relationship_type_id == relation
    })
}

/// Which row, if any, makes `start -[relation]-> end` legal. Forward wins when both exist.
pub fn connection_direction(
    schema: &TypeSchema,
    start: &NodeTypeId,
    end: &NodeTypeId,
    relation: &RelationTypeId,
) -> Option<RelationDirection> {
    if has_row(schema, start, end, relation) {
        Some(RelationDirection::Forward)
    } else if has_row(schema, end, start, relation) {
        Some(RelationDirection::Reverse)
    } else {
        None
    }
}

pub fn is_valid_connection(
    schema: &TypeSchema,
    source: &NodeTypeId,
    target: &NodeTypeId,
    relation: &RelationTypeId,
) -> bool {
    connection_direction(schema, source, target, relation).is_some()
}

/// The text a relation drawn from a `start` node to an `end` node displays.
///
/// Inconsistent input falls back to the relation's `label`, and an unknown relation type to an
/// empty string.
pub fn resolve_direction_label(
    schema: &TypeSchema,
    start: &NodeTypeId,
    end: &NodeTypeId,
    relation: &RelationTypeId,
) -> String {
    let Some(relation_type) = schema.relation_type(relation) else {
        tracing::warn!("[validator] Unknown relation type {relation}, no label to display");
        return String::new();
    };
    match connection_direction(schema, start, end, relation) {
        Some(RelationDirection::Reverse) => relation_type.complement.clone(),
        Some(RelationDirection::Forward) => relation_type.label.clone(),
        None => {
            tracing::debug!(
                "[validator] No row for {start} -[{relation}]-> {end}, defaulting to label"
            );
            relation_type.label.clone()
        }
    }
}

/// Every node type a `source` node may connect to with `relation`, in either direction.
pub fn compatible_target_types(
    schema: &TypeSchema,
    relation: &RelationTypeId,
    source: &NodeTypeId,
) -> BTreeSet<NodeTypeId> {
    schema
        .discourse_relations
        .iter()
        .filter(|dr| &dr.relationship_type_id == relation)
        .filter_map(|dr| {
            if &dr.source_id == source {
                Some(dr.destination_id.clone())
            } else if &dr.destination_id == source {
                Some(dr.source_id.clone())
            } else {
                None
            }
        })
        .collect()
}
