// src/models/item.rs
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,      // Primary key, assigned by the database on insert
    pub name: String, // Item name
    pub price: f64,   // Unit price, stored as REAL
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Item {}, {}, {}>", self.id, self.name, self.price)
    }
}
