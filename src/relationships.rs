//! Relationship graph derived from a schema snapshot.
//!
//! Edges carry table and column names only: lookups back into the
//! snapshot, never ownership of it. The graph is a pure function of the
//! snapshot: rebuild it whenever the snapshot changes, cache it keyed by
//! the snapshot fingerprint.

use crate::schema::SchemaModel;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeOrigin {
    Declared,
    Inferred,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
    pub origin: EdgeOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSuggestion {
    pub left_table: String,
    pub right_table: String,
    pub condition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGraph {
    pub edges: Vec<RelationshipEdge>,
}

impl RelationshipGraph {
    /// Deterministic build: declared edges first, then inferred edges that
    /// do not duplicate a declared edge over the same source columns, the
    /// whole set sorted into a canonical order.
    pub fn build(schema: &SchemaModel) -> Self {
        let mut edges: Vec<RelationshipEdge> = Vec::new();
        for origin in [EdgeOrigin::Declared, EdgeOrigin::Inferred] {
            for table in &schema.tables {
                for fk in &table.foreign_keys {
                    let fk_origin = if fk.inferred {
                        EdgeOrigin::Inferred
                    } else {
                        EdgeOrigin::Declared
                    };
                    if fk_origin != origin {
                        continue;
                    }
                    let candidate = RelationshipEdge {
                        from_table: table.name.clone(),
                        from_columns: fk.columns.clone(),
                        to_table: fk.referenced_table.clone(),
                        to_columns: fk.referenced_columns.clone(),
                        origin: fk_origin,
                    };
                    if origin == EdgeOrigin::Inferred && edges.iter().any(|e| covers(e, &candidate))
                    {
                        continue;
                    }
                    edges.push(candidate);
                }
            }
        }
        edges.sort();
        edges.dedup();
        Self { edges }
    }

    pub fn edges_from(&self, table: &str) -> Vec<&RelationshipEdge> {
        self.edges
            .iter()
            .filter(|e| e.from_table.eq_ignore_ascii_case(table))
            .collect()
    }

    /// Tables reachable over one edge, in either direction.
    pub fn related_tables(&self, table: &str) -> Vec<String> {
        let mut related: Vec<String> = Vec::new();
        for edge in &self.edges {
            if edge.from_table.eq_ignore_ascii_case(table) {
                related.push(edge.to_table.clone());
            } else if edge.to_table.eq_ignore_ascii_case(table) {
                related.push(edge.from_table.clone());
            }
        }
        related.sort();
        related.dedup();
        related
    }

    /// Shortest chain of edges connecting two tables, ignoring edge
    /// direction (join paths are symmetric).
    pub fn join_path(&self, from: &str, to: &str) -> Option<Vec<RelationshipEdge>> {
        if from.eq_ignore_ascii_case(to) {
            return Some(Vec::new());
        }
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.to_ascii_lowercase());
        let mut queue: VecDeque<(String, Vec<RelationshipEdge>)> = VecDeque::new();
        queue.push_back((from.to_ascii_lowercase(), Vec::new()));

        while let Some((current, path)) = queue.pop_front() {
            for edge in &self.edges {
                let next = if edge.from_table.eq_ignore_ascii_case(&current) {
                    Some(edge.to_table.to_ascii_lowercase())
                } else if edge.to_table.eq_ignore_ascii_case(&current) {
                    Some(edge.from_table.to_ascii_lowercase())
                } else {
                    None
                };
                let Some(next) = next else { continue };
                if !visited.insert(next.clone()) {
                    continue;
                }
                let mut new_path = path.clone();
                new_path.push(edge.clone());
                if next == to.to_ascii_lowercase() {
                    return Some(new_path);
                }
                queue.push_back((next, new_path));
            }
        }
        None
    }

    /// INNER JOIN suggestions for a set of tables the caller intends to
    /// combine, derived from edges connecting any pair of them.
    pub fn suggest_joins(&self, tables: &[&str]) -> Vec<JoinSuggestion> {
        let wanted: HashSet<String> = tables.iter().map(|t| t.to_ascii_lowercase()).collect();
        let mut suggestions = Vec::new();
        for edge in &self.edges {
            if wanted.contains(&edge.from_table.to_ascii_lowercase())
                && wanted.contains(&edge.to_table.to_ascii_lowercase())
            {
                let pairs: Vec<String> = edge
                    .from_columns
                    .iter()
                    .zip(edge.to_columns.iter())
                    .map(|(f, t)| {
                        format!("{}.{} = {}.{}", edge.from_table, f, edge.to_table, t)
                    })
                    .collect();
                if pairs.is_empty() {
                    continue;
                }
                suggestions.push(JoinSuggestion {
                    left_table: edge.from_table.clone(),
                    right_table: edge.to_table.clone(),
                    condition: pairs.join(" AND "),
                });
            }
        }
        suggestions
    }
}

/// An edge covers a candidate when it connects the same tables over the
/// same source columns, case-insensitively.
fn covers(existing: &RelationshipEdge, candidate: &RelationshipEdge) -> bool {
    existing.from_table.eq_ignore_ascii_case(&candidate.from_table)
        && existing.to_table.eq_ignore_ascii_case(&candidate.to_table)
        && existing.from_columns.len() == candidate.from_columns.len()
        && existing
            .from_columns
            .iter()
            .zip(candidate.from_columns.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, TableDescriptor, TypeCategory};

    fn column(name: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            declared_type: "INTEGER".to_string(),
            category: TypeCategory::Integer,
            nullable: !pk,
            primary_key: pk,
        }
    }

    fn fk(cols: &[&str], table: &str, ref_cols: &[&str], inferred: bool) -> ForeignKeyDescriptor {
        ForeignKeyDescriptor {
            columns: cols.iter().map(|s| s.to_string()).collect(),
            referenced_table: table.to_string(),
            referenced_columns: ref_cols.iter().map(|s| s.to_string()).collect(),
            inferred,
        }
    }

    fn sample_model() -> SchemaModel {
        SchemaModel::new(
            "shop",
            Dialect::Sqlite,
            vec![
                TableDescriptor {
                    name: "customers".to_string(),
                    columns: vec![column("customer_id", true)],
                    foreign_keys: vec![],
                },
                TableDescriptor {
                    name: "orders".to_string(),
                    columns: vec![column("order_id", true), column("customer_id", false)],
                    foreign_keys: vec![
                        fk(&["customer_id"], "customers", &["customer_id"], false),
                        // Inferred duplicate of the declared edge above.
                        fk(&["customer_id"], "customers", &["customer_id"], true),
                    ],
                },
                TableDescriptor {
                    name: "shipments".to_string(),
                    columns: vec![column("shipment_id", true), column("order_id", false)],
                    foreign_keys: vec![fk(&["order_id"], "orders", &["order_id"], true)],
                },
            ],
        )
    }

    #[test]
    fn test_build_is_deterministic() {
        let model = sample_model();
        let a = RelationshipGraph::build(&model);
        let b = RelationshipGraph::build(&model);
        assert_eq!(a, b);
    }

    #[test]
    fn test_declared_suppresses_equal_inferred() {
        let graph = RelationshipGraph::build(&sample_model());
        let orders_edges = graph.edges_from("orders");
        assert_eq!(orders_edges.len(), 1);
        assert_eq!(orders_edges[0].origin, EdgeOrigin::Declared);
    }

    #[test]
    fn test_join_path_crosses_two_edges() {
        let graph = RelationshipGraph::build(&sample_model());
        let path = graph.join_path("shipments", "customers").unwrap();
        assert_eq!(path.len(), 2);
        assert!(graph.join_path("customers", "customers").unwrap().is_empty());
        assert!(graph.join_path("customers", "unknown").is_none());
    }

    #[test]
    fn test_suggest_joins() {
        let graph = RelationshipGraph::build(&sample_model());
        let suggestions = graph.suggest_joins(&["orders", "customers"]);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(
            suggestions[0].condition,
            "orders.customer_id = customers.customer_id"
        );
    }

    #[test]
    fn test_related_tables_both_directions() {
        let graph = RelationshipGraph::build(&sample_model());
        assert_eq!(graph.related_tables("orders"), vec!["customers", "shipments"]);
    }
}
