//! Rule-driven JSON rendering of graph nodes.
//!
//! Every entity declares exclusion rules for the back-edges that would
//! otherwise loop (`-reviews.customer` on a customer, and so on). While the
//! traversal descends, each nested record contributes its own rules with the
//! current path prefixed, so a review nested in a customer also drops
//! `reviews.item.reviews`. Rules are matched against the dotted path of a
//! field; excluding a field drops everything beneath it.

use crate::error::{Result, StoreError};
use crate::graph::SchemaGraph;
use crate::models::{Customer, Item, Review};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Nesting ceiling for a single render. Only reachable when the rules fail
/// to cut a cycle.
pub const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Customer,
    Item,
    Review,
}

impl Entity {
    pub fn default_rules(self) -> &'static [&'static str] {
        match self {
            Entity::Customer => &["-reviews.customer"],
            Entity::Item => &["-reviews.item"],
            Entity::Review => &["-customer.reviews", "-item.reviews"],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Entity::Customer => "customer",
            Entity::Item => "item",
            Entity::Review => "review",
        }
    }
}

/// A set of excluded field paths, written `-a.b.c`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializeRules {
    excluded: BTreeSet<String>,
}

impl SerializeRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `-path` rules. The leading `-` is optional; blank rules are skipped.
    pub fn parse<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        rules
            .into_iter()
            .fold(Self::new(), |acc, rule| acc.exclude(rule.as_ref()))
    }

    pub fn exclude(mut self, rule: &str) -> Self {
        let path = rule.trim().trim_start_matches('-').trim_matches('.');
        if !path.is_empty() {
            self.excluded.insert(path.to_string());
        }
        self
    }

    /// True when `path` or any of its ancestors is excluded.
    pub fn is_excluded(&self, path: &str) -> bool {
        if self.excluded.contains(path) {
            return true;
        }
        path.match_indices('.')
            .any(|(idx, _)| self.excluded.contains(&path[..idx]))
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    fn merged_under(&self, prefix: &str, rules: &[&str]) -> Self {
        let mut merged = self.clone();
        for rule in rules {
            let path = rule.trim_start_matches('-');
            merged.excluded.insert(join(prefix, path));
        }
        merged
    }
}

#[derive(Clone, Copy)]
enum Node<'g> {
    Customer(&'g Customer),
    Item(&'g Item),
    Review(&'g Review),
}

impl Node<'_> {
    fn entity(&self) -> Entity {
        match self {
            Node::Customer(_) => Entity::Customer,
            Node::Item(_) => Entity::Item,
            Node::Review(_) => Entity::Review,
        }
    }
}

/// Renders customers, items and reviews from a loaded `SchemaGraph`.
pub struct Serializer<'g> {
    graph: &'g SchemaGraph,
    rules: SerializeRules,
    default_rules: bool,
    max_depth: usize,
}

impl<'g> Serializer<'g> {
    pub fn new(graph: &'g SchemaGraph) -> Self {
        Serializer {
            graph,
            rules: SerializeRules::new(),
            default_rules: true,
            max_depth: MAX_DEPTH,
        }
    }

    /// Extra exclusions for this render, relative to the top-level record.
    pub fn with_rules(mut self, rules: SerializeRules) -> Self {
        self.rules = rules;
        self
    }

    /// Drops the per-entity back-edge rules; only the caller's rules apply.
    pub fn without_default_rules(mut self) -> Self {
        self.default_rules = false;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn customer(&self, id: i64) -> Result<Value> {
        let customer = self
            .graph
            .customer(id)
            .ok_or_else(|| StoreError::not_found("customer", id))?;
        self.render(Node::Customer(customer))
    }

    pub fn item(&self, id: i64) -> Result<Value> {
        let item = self
            .graph
            .item(id)
            .ok_or_else(|| StoreError::not_found("item", id))?;
        self.render(Node::Item(item))
    }

    pub fn review(&self, id: i64) -> Result<Value> {
        let review = self
            .graph
            .review(id)
            .ok_or_else(|| StoreError::not_found("review", id))?;
        self.render(Node::Review(review))
    }

    fn render(&self, node: Node<'g>) -> Result<Value> {
        debug!(
            "[SERIALIZE] Rendering {} with {} extra rules",
            node.entity().name(),
            self.rules.len()
        );
        self.node_value(node, "", &self.rules, 0)
    }

    fn node_value(
        &self,
        node: Node<'g>,
        path: &str,
        inherited: &SerializeRules,
        depth: usize,
    ) -> Result<Value> {
        if depth > self.max_depth {
            return Err(StoreError::SerializationDepth {
                path: path.to_string(),
            });
        }

        let rules = if self.default_rules {
            inherited.merged_under(path, node.entity().default_rules())
        } else {
            inherited.clone()
        };

        let mut map = Map::new();
        match node {
            Node::Customer(customer) => {
                self.scalars(&mut map, customer, path, &rules)?;
                let reviews = self.graph.customer_reviews(customer.id);
                self.collection(&mut map, "reviews", reviews, path, &rules, depth)?;
            }
            Node::Item(item) => {
                self.scalars(&mut map, item, path, &rules)?;
                let reviews = self.graph.item_reviews(item.id);
                self.collection(&mut map, "reviews", reviews, path, &rules, depth)?;
            }
            Node::Review(review) => {
                self.scalars(&mut map, review, path, &rules)?;
                let customer = self.graph.review_customer(review).map(Node::Customer);
                self.reference(&mut map, "customer", customer, path, &rules, depth)?;
                let item = self.graph.review_item(review).map(Node::Item);
                self.reference(&mut map, "item", item, path, &rules, depth)?;
            }
        }
        Ok(Value::Object(map))
    }

    fn scalars<T: Serialize>(
        &self,
        map: &mut Map<String, Value>,
        row: &T,
        path: &str,
        rules: &SerializeRules,
    ) -> Result<()> {
        if let Value::Object(columns) = serde_json::to_value(row)? {
            for (key, value) in columns {
                if !rules.is_excluded(&join(path, &key)) {
                    map.insert(key, value);
                }
            }
        }
        Ok(())
    }

    fn collection(
        &self,
        map: &mut Map<String, Value>,
        field: &str,
        reviews: Vec<&'g Review>,
        path: &str,
        rules: &SerializeRules,
        depth: usize,
    ) -> Result<()> {
        let field_path = join(path, field);
        if rules.is_excluded(&field_path) {
            return Ok(());
        }
        let values = reviews
            .into_iter()
            .map(|review| self.node_value(Node::Review(review), &field_path, rules, depth + 1))
            .collect::<Result<Vec<_>>>()?;
        map.insert(field.to_string(), Value::Array(values));
        Ok(())
    }

    fn reference(
        &self,
        map: &mut Map<String, Value>,
        field: &str,
        target: Option<Node<'g>>,
        path: &str,
        rules: &SerializeRules,
        depth: usize,
    ) -> Result<()> {
        let field_path = join(path, field);
        if rules.is_excluded(&field_path) {
            return Ok(());
        }
        let value = match target {
            Some(node) => self.node_value(node, &field_path, rules, depth + 1)?,
            None => Value::Null,
        };
        map.insert(field.to_string(), value);
        Ok(())
    }
}

fn join(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shop() -> SchemaGraph {
        SchemaGraph::from_rows(
            vec![Customer {
                id: 1,
                name: "Alice".into(),
            }],
            vec![Item {
                id: 1,
                name: "Widget".into(),
                price: 9.99,
            }],
            vec![Review {
                id: 1,
                comment: None,
                customer_id: Some(1),
                item_id: Some(1),
            }],
        )
        .unwrap()
    }

    /// Collects every dotted key path in a JSON value, array indices elided.
    fn key_paths(value: &Value, prefix: &str, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = join(prefix, key);
                    out.push(path.clone());
                    key_paths(child, &path, out);
                }
            }
            Value::Array(values) => {
                for child in values {
                    key_paths(child, prefix, out);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_rule_matching_covers_descendants() {
        let rules = SerializeRules::parse(["-reviews.customer"]);
        assert!(rules.is_excluded("reviews.customer"));
        assert!(rules.is_excluded("reviews.customer.name"));
        assert!(!rules.is_excluded("reviews"));
        assert!(!rules.is_excluded("reviews.customer_id"));
    }

    #[test]
    fn test_parse_skips_blank_rules() {
        let rules = SerializeRules::parse(["", "-", "name", "-reviews."]);
        assert_eq!(rules.len(), 2);
        assert!(rules.is_excluded("name"));
        assert!(rules.is_excluded("reviews"));
    }

    #[test]
    fn test_customer_shape() {
        let graph = shop();
        let value = Serializer::new(&graph).customer(1).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "name": "Alice",
                "reviews": [{
                    "id": 1,
                    "comment": null,
                    "customer_id": 1,
                    "item_id": 1,
                    "item": {"id": 1, "name": "Widget", "price": 9.99}
                }]
            })
        );
    }

    #[test]
    fn test_item_shape() {
        let graph = shop();
        let value = Serializer::new(&graph).item(1).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "name": "Widget",
                "price": 9.99,
                "reviews": [{
                    "id": 1,
                    "comment": null,
                    "customer_id": 1,
                    "item_id": 1,
                    "customer": {"id": 1, "name": "Alice"}
                }]
            })
        );
    }

    #[test]
    fn test_review_shape() {
        let graph = shop();
        let value = Serializer::new(&graph).review(1).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 1,
                "comment": null,
                "customer_id": 1,
                "item_id": 1,
                "customer": {"id": 1, "name": "Alice"},
                "item": {"id": 1, "name": "Widget", "price": 9.99}
            })
        );
    }

    #[test]
    fn test_customer_never_nests_customer_under_reviews() {
        let graph = shop();
        let value = Serializer::new(&graph).customer(1).unwrap();
        let mut paths = Vec::new();
        key_paths(&value, "", &mut paths);
        assert!(paths
            .iter()
            .all(|p| !p.starts_with("reviews.customer") || p == "reviews.customer_id"));
    }

    #[test]
    fn test_detached_review_renders_null_reference() {
        let graph = SchemaGraph::from_rows(
            vec![],
            vec![Item {
                id: 1,
                name: "Widget".into(),
                price: 1.0,
            }],
            vec![Review {
                id: 5,
                comment: Some("meh".into()),
                customer_id: None,
                item_id: Some(1),
            }],
        )
        .unwrap();
        let value = Serializer::new(&graph).review(5).unwrap();
        assert_eq!(value["customer"], Value::Null);
        assert_eq!(value["item"]["name"], "Widget");
    }

    #[test]
    fn test_caller_rules_extend_defaults() {
        let graph = shop();
        let value = Serializer::new(&graph)
            .with_rules(SerializeRules::parse(["-reviews.item.price", "-name"]))
            .customer(1)
            .unwrap();
        assert!(value.get("name").is_none());
        assert_eq!(value["reviews"][0]["item"], json!({"id": 1, "name": "Widget"}));
    }

    #[test]
    fn test_missing_rules_hit_depth_ceiling() {
        let graph = shop();
        let err = Serializer::new(&graph)
            .without_default_rules()
            .with_max_depth(4)
            .customer(1)
            .unwrap_err();
        assert!(matches!(err, StoreError::SerializationDepth { .. }));
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let graph = shop();
        let err = Serializer::new(&graph).item(99).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "item", id: 99 }));
    }
}
