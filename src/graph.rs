use crate::error::{Result, StoreError};
use crate::models::{Customer, Item, Review};
use std::collections::BTreeMap;

/// In-memory ownership graph over the three tables.
///
/// Rows are keyed by id. The customer -> reviews and item -> reviews
/// indices are derived from each review's foreign keys when the graph is
/// built, so the two directions of a relationship always agree.
#[derive(Debug, Clone, Default)]
pub struct SchemaGraph {
    customers: BTreeMap<i64, Customer>,
    items: BTreeMap<i64, Item>,
    reviews: BTreeMap<i64, Review>,
    customer_reviews: BTreeMap<i64, Vec<i64>>,
    item_reviews: BTreeMap<i64, Vec<i64>>,
}

impl SchemaGraph {
    /// Builds the graph, rejecting duplicate ids and dangling foreign keys.
    pub fn from_rows(
        customers: Vec<Customer>,
        items: Vec<Item>,
        reviews: Vec<Review>,
    ) -> Result<Self> {
        let mut graph = SchemaGraph::default();

        for customer in customers {
            let id = customer.id;
            if graph.customers.insert(id, customer).is_some() {
                let message = format!("duplicate customer id {}", id);
                return Err(StoreError::integrity(message));
            }
            graph.customer_reviews.insert(id, Vec::new());
        }
        for item in items {
            let id = item.id;
            if graph.items.insert(id, item).is_some() {
                let message = format!("duplicate item id {}", id);
                return Err(StoreError::integrity(message));
            }
            graph.item_reviews.insert(id, Vec::new());
        }
        for review in reviews {
            let id = review.id;
            if graph.reviews.insert(id, review).is_some() {
                let message = format!("duplicate review id {}", id);
                return Err(StoreError::integrity(message));
            }
        }

        // Walk reviews in id order so every collection comes out sorted.
        for review in graph.reviews.values() {
            if let Some(customer_id) = review.customer_id {
                graph
                    .customer_reviews
                    .get_mut(&customer_id)
                    .ok_or_else(|| {
                        StoreError::integrity(format!(
                            "review {} references missing customer {}",
                            review.id, customer_id
                        ))
                    })?
                    .push(review.id);
            }
            if let Some(item_id) = review.item_id {
                graph
                    .item_reviews
                    .get_mut(&item_id)
                    .ok_or_else(|| {
                        StoreError::integrity(format!(
                            "review {} references missing item {}",
                            review.id, item_id
                        ))
                    })?
                    .push(review.id);
            }
        }

        Ok(graph)
    }

    pub fn customer(&self, id: i64) -> Option<&Customer> {
        self.customers.get(&id)
    }

    pub fn item(&self, id: i64) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn review(&self, id: i64) -> Option<&Review> {
        self.reviews.get(&id)
    }

    pub fn customers(&self) -> impl Iterator<Item = &Customer> {
        self.customers.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn reviews(&self) -> impl Iterator<Item = &Review> {
        self.reviews.values()
    }

    pub fn customer_reviews(&self, customer_id: i64) -> Vec<&Review> {
        self.collect_reviews(self.customer_reviews.get(&customer_id))
    }

    pub fn item_reviews(&self, item_id: i64) -> Vec<&Review> {
        self.collect_reviews(self.item_reviews.get(&item_id))
    }

    pub fn review_customer(&self, review: &Review) -> Option<&Customer> {
        review.customer_id.and_then(|id| self.customers.get(&id))
    }

    pub fn review_item(&self, review: &Review) -> Option<&Item> {
        review.item_id.and_then(|id| self.items.get(&id))
    }

    /// Items reachable through the customer's reviews, one entry per review.
    pub fn customer_items(&self, customer_id: i64) -> Vec<&Item> {
        self.customer_reviews(customer_id)
            .into_iter()
            .filter_map(|review| self.review_item(review))
            .collect()
    }

    fn collect_reviews(&self, ids: Option<&Vec<i64>>) -> Vec<&Review> {
        ids.map(|ids| ids.iter().filter_map(|id| self.reviews.get(id)).collect())
            .unwrap_or_default()
    }
}
