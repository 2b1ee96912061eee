//! Relationship commands implementation

use crate::relations::RelationshipView;

/// Print edges under a root to console
pub fn print_edges(root_submission_id: i64, edges: &[RelationshipView]) {
    println!("\n🔗 Relationships under submission {}\n", root_submission_id);

    if edges.is_empty() {
        println!("No relationships. Use 'formgraph rel link' to add one.");
        return;
    }

    for edge in edges {
        println!(
            "• {} -[{}]-> {}",
            edge.source_label, edge.relationship.relationship_type, edge.target_label
        );
        println!(
            "  ID: {}  ({} -> {})",
            edge.relationship.id,
            edge.relationship.source_submission_id,
            edge.relationship.target_submission_id
        );
    }
}

/// Print `(id, label)` choices, one per line
pub fn print_choices(choices: &[(i64, String)]) {
    if choices.is_empty() {
        println!("No matching submissions.");
        return;
    }
    for (id, label) in choices {
        println!("{}\t{}", id, label);
    }
}
