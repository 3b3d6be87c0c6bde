// src/models/review.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,                  // Primary key, assigned by the database on insert
    pub comment: Option<String>,  // Free-text comment, NULL when unset
    pub customer_id: Option<i64>, // FK -> customers.id, NULL once detached
    pub item_id: Option<i64>,     // FK -> items.id, NULL once detached
}

impl fmt::Display for Review {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_none<T: fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "None".to_string())
        }
        write!(
            f,
            "<Review {}, {}, {}, {}>",
            self.id,
            or_none(&self.comment),
            or_none(&self.customer_id),
            or_none(&self.item_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_display_with_unset_fields() {
        let review = Review {
            id: 3,
            comment: None,
            customer_id: Some(1),
            item_id: None,
        };
        assert_eq!(review.to_string(), "<Review 3, None, 1, None>");
    }
}
