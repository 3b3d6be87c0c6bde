use crate::config::DbConfig;
use crate::error::{Result, StoreError};
use crate::graph::SchemaGraph;
use crate::models::{Customer, Item, Review};
use crate::serialize::{SerializeRules, Serializer};
use rusqlite::{params, Connection, Row};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// Owns the SQLite connection; every method holds the lock for its whole body
#[derive(Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

const CUSTOMER_COLUMNS: &str = "id, name";
const ITEM_COLUMNS: &str = "id, name, price";
const REVIEW_COLUMNS: &str = "id, comment, customer_id, item_id";

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        comment: row.get(1)?,
        customer_id: row.get(2)?,
        item_id: row.get(3)?,
    })
}

// Single-row lookup that maps "no rows" to NotFound
fn fetch_one<T>(
    conn: &Connection,
    sql: &str,
    entity: &'static str,
    id: i64,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<T> {
    match conn.query_row(sql, [id], map) {
        Ok(row) => Ok(row),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::not_found(entity, id)),
        Err(e) => Err(e.into()),
    }
}

fn fetch_customer(conn: &Connection, id: i64) -> Result<Customer> {
    let sql = format!("SELECT {} FROM customers WHERE id = ?", CUSTOMER_COLUMNS);
    fetch_one(conn, &sql, "customer", id, customer_from_row)
}

fn fetch_item(conn: &Connection, id: i64) -> Result<Item> {
    let sql = format!("SELECT {} FROM items WHERE id = ?", ITEM_COLUMNS);
    fetch_one(conn, &sql, "item", id, item_from_row)
}

fn fetch_review(conn: &Connection, id: i64) -> Result<Review> {
    let sql = format!("SELECT {} FROM reviews WHERE id = ?", REVIEW_COLUMNS);
    fetch_one(conn, &sql, "review", id, review_from_row)
}

fn fetch_all<T>(
    conn: &Connection,
    sql: &str,
    param: Option<i64>,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = match param {
        Some(id) => stmt.query_map([id], map)?.collect::<rusqlite::Result<Vec<T>>>()?,
        None => stmt.query_map([], map)?.collect::<rusqlite::Result<Vec<T>>>()?,
    };
    Ok(rows)
}

// Point one foreign key of a review at a new parent (or NULL)
fn set_review_parent(
    conn: &Connection,
    review_id: i64,
    column: &str,
    parent_id: Option<i64>,
) -> Result<Review> {
    let sql = format!("UPDATE reviews SET {} = ? WHERE id = ?", column);
    let changed = conn.execute(&sql, params![parent_id, review_id])?;
    if changed == 0 {
        return Err(StoreError::not_found("review", review_id));
    }
    fetch_review(conn, review_id)
}

impl Database {
    // Create a new database connection with foreign keys enforced
    pub fn new(db_path: &str) -> Result<Self> {
        Self::open(&DbConfig {
            path: db_path.to_string(),
            ..DbConfig::default()
        })
    }

    pub fn open(config: &DbConfig) -> Result<Self> {
        let conn = Connection::open(&config.path)?;
        // Set both ways: the bundled SQLite defaults foreign_keys to ON
        if config.enforce_foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        } else {
            conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
            warn!("[DB] Foreign key enforcement disabled for {}", config.path);
        }
        info!("Database connection established at: {}", config.path);
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // Create the three tables; foreign key names follow fk_<table>_<column>_<referred_table>
    pub async fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        // 1. Customers table
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );",
        )
        .map_err(|e| {
            warn!("Failed creating customers table: {}", e);
            e
        })?;

        // 2. Items table
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                price REAL NOT NULL
            );",
        )
        .map_err(|e| {
            warn!("Failed creating items table: {}", e);
            e
        })?;

        // 3. Reviews table, the join between customers and items
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY,
                comment TEXT,
                customer_id INTEGER
                    CONSTRAINT fk_reviews_customer_id_customers REFERENCES customers (id),
                item_id INTEGER
                    CONSTRAINT fk_reviews_item_id_items REFERENCES items (id)
            );",
        )
        .map_err(|e| {
            warn!("Failed creating reviews table: {}", e);
            e
        })?;

        info!("[DB] Schema ready");
        Ok(())
    }

    pub async fn insert_customer(&self, name: &str) -> Result<Customer> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO customers (name) VALUES (?)", [name])?;
        let customer = Customer {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        };
        debug!("[DB] Inserted {}", customer);
        Ok(customer)
    }

    pub async fn get_customer(&self, id: i64) -> Result<Customer> {
        let conn = self.conn.lock().await;
        fetch_customer(&conn, id)
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM customers ORDER BY id", CUSTOMER_COLUMNS);
        fetch_all(&conn, &sql, None, customer_from_row)
    }

    pub async fn update_customer_name(&self, id: i64, name: &str) -> Result<Customer> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE customers SET name = ? WHERE id = ?",
            params![name, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("customer", id));
        }
        debug!("[DB] Renamed customer {} to '{}'", id, name);
        fetch_customer(&conn, id)
    }

    // Deletes the customer and detaches (does not delete) its reviews
    pub async fn delete_customer(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let detached = tx.execute(
            "UPDATE reviews SET customer_id = NULL WHERE customer_id = ?",
            [id],
        )?;
        let deleted = tx.execute("DELETE FROM customers WHERE id = ?", [id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("customer", id));
        }

        tx.commit()?;
        info!("[DB] Customer {} deleted, {} reviews detached", id, detached);
        Ok(())
    }

    pub async fn insert_item(&self, name: &str, price: f64) -> Result<Item> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO items (name, price) VALUES (?, ?)", params![name, price])?;
        let item = Item {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            price,
        };
        debug!("[DB] Inserted {}", item);
        Ok(item)
    }

    pub async fn get_item(&self, id: i64) -> Result<Item> {
        let conn = self.conn.lock().await;
        fetch_item(&conn, id)
    }

    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS);
        fetch_all(&conn, &sql, None, item_from_row)
    }

    pub async fn update_item(&self, id: i64, name: &str, price: f64) -> Result<Item> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE items SET name = ?, price = ? WHERE id = ?",
            params![name, price, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("item", id));
        }
        fetch_item(&conn, id)
    }

    // Deletes the item and detaches (does not delete) its reviews
    pub async fn delete_item(&self, id: i64) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let detached = tx.execute(
            "UPDATE reviews SET item_id = NULL WHERE item_id = ?",
            [id],
        )?;
        let deleted = tx.execute("DELETE FROM items WHERE id = ?", [id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("item", id));
        }

        tx.commit()?;
        info!("[DB] Item {} deleted, {} reviews detached", id, detached);
        Ok(())
    }

    pub async fn insert_review(
        &self,
        customer_id: i64,
        item_id: i64,
        comment: Option<&str>,
    ) -> Result<Review> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO reviews (comment, customer_id, item_id) VALUES (?, ?, ?)",
            params![comment, customer_id, item_id],
        )
        .map_err(|e| {
            warn!(
                "[DB] Review insert failed for customer {} / item {}: {}",
                customer_id, item_id, e
            );
            StoreError::from(e)
        })?;
        let review = Review {
            id: conn.last_insert_rowid(),
            comment: comment.map(str::to_string),
            customer_id: Some(customer_id),
            item_id: Some(item_id),
        };
        debug!("[DB] Inserted {}", review);
        Ok(review)
    }

    pub async fn get_review(&self, id: i64) -> Result<Review> {
        let conn = self.conn.lock().await;
        fetch_review(&conn, id)
    }

    pub async fn list_reviews(&self) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM reviews ORDER BY id", REVIEW_COLUMNS);
        fetch_all(&conn, &sql, None, review_from_row)
    }

    pub async fn update_review_comment(&self, id: i64, comment: Option<&str>) -> Result<Review> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE reviews SET comment = ? WHERE id = ?",
            params![comment, id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("review", id));
        }
        fetch_review(&conn, id)
    }

    pub async fn delete_review(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        if conn.execute("DELETE FROM reviews WHERE id = ?", [id])? == 0 {
            return Err(StoreError::not_found("review", id));
        }
        debug!("[DB] Review {} deleted", id);
        Ok(())
    }

    // Review.customer setter; the review leaves its old customer's collection
    pub async fn set_review_customer(
        &self,
        review_id: i64,
        customer_id: Option<i64>,
    ) -> Result<Review> {
        let conn = self.conn.lock().await;
        set_review_parent(&conn, review_id, "customer_id", customer_id)
    }

    // Review.item setter; the review leaves its old item's collection
    pub async fn set_review_item(&self, review_id: i64, item_id: Option<i64>) -> Result<Review> {
        let conn = self.conn.lock().await;
        set_review_parent(&conn, review_id, "item_id", item_id)
    }

    pub async fn review_customer(&self, review_id: i64) -> Result<Option<Customer>> {
        let conn = self.conn.lock().await;
        match fetch_review(&conn, review_id)?.customer_id {
            Some(id) => fetch_customer(&conn, id).map(Some),
            None => Ok(None),
        }
    }

    pub async fn review_item(&self, review_id: i64) -> Result<Option<Item>> {
        let conn = self.conn.lock().await;
        match fetch_review(&conn, review_id)?.item_id {
            Some(id) => fetch_item(&conn, id).map(Some),
            None => Ok(None),
        }
    }

    pub async fn customer_reviews(&self, customer_id: i64) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        fetch_customer(&conn, customer_id)?;
        let sql = format!(
            "SELECT {} FROM reviews WHERE customer_id = ? ORDER BY id",
            REVIEW_COLUMNS
        );
        fetch_all(&conn, &sql, Some(customer_id), review_from_row)
    }

    pub async fn item_reviews(&self, item_id: i64) -> Result<Vec<Review>> {
        let conn = self.conn.lock().await;
        fetch_item(&conn, item_id)?;
        let sql = format!(
            "SELECT {} FROM reviews WHERE item_id = ? ORDER BY id",
            REVIEW_COLUMNS
        );
        fetch_all(&conn, &sql, Some(item_id), review_from_row)
    }

    // Customer.reviews.append(review); a missing customer fails the FK check
    pub async fn add_customer_review(&self, customer_id: i64, review_id: i64) -> Result<Review> {
        let conn = self.conn.lock().await;
        set_review_parent(&conn, review_id, "customer_id", Some(customer_id))
    }

    // Customer.reviews.remove(review); the review survives with no customer
    pub async fn remove_customer_review(&self, customer_id: i64, review_id: i64) -> Result<Review> {
        let conn = self.conn.lock().await;
        let review = fetch_review(&conn, review_id)?;
        if review.customer_id != Some(customer_id) {
            return Err(StoreError::not_found("review", review_id));
        }
        set_review_parent(&conn, review_id, "customer_id", None)
    }

    // Item.reviews.append(review); a missing item fails the FK check
    pub async fn add_item_review(&self, item_id: i64, review_id: i64) -> Result<Review> {
        let conn = self.conn.lock().await;
        set_review_parent(&conn, review_id, "item_id", Some(item_id))
    }

    // Item.reviews.remove(review); the review survives with no item
    pub async fn remove_item_review(&self, item_id: i64, review_id: i64) -> Result<Review> {
        let conn = self.conn.lock().await;
        let review = fetch_review(&conn, review_id)?;
        if review.item_id != Some(item_id) {
            return Err(StoreError::not_found("review", review_id));
        }
        set_review_parent(&conn, review_id, "item_id", None)
    }

    // Items reachable through the customer's reviews, one per review
    pub async fn customer_items(&self, customer_id: i64) -> Result<Vec<Item>> {
        let conn = self.conn.lock().await;
        fetch_customer(&conn, customer_id)?;
        fetch_all(
            &conn,
            "SELECT i.id, i.name, i.price
             FROM reviews r
             JOIN items i ON i.id = r.item_id
             WHERE r.customer_id = ?
             ORDER BY r.id",
            Some(customer_id),
            item_from_row,
        )
    }

    // Customer.items.append(item): creates a review with no comment
    pub async fn append_customer_item(&self, customer_id: i64, item_id: i64) -> Result<Review> {
        debug!("[DB] Linking customer {} to item {}", customer_id, item_id);
        self.insert_review(customer_id, item_id, None).await
    }

    // Load every row into an ownership graph
    pub async fn snapshot(&self) -> Result<SchemaGraph> {
        let conn = self.conn.lock().await;
        let customers = fetch_all(
            &conn,
            &format!("SELECT {} FROM customers ORDER BY id", CUSTOMER_COLUMNS),
            None,
            customer_from_row,
        )?;
        let items = fetch_all(
            &conn,
            &format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS),
            None,
            item_from_row,
        )?;
        let reviews = fetch_all(
            &conn,
            &format!("SELECT {} FROM reviews ORDER BY id", REVIEW_COLUMNS),
            None,
            review_from_row,
        )?;
        debug!(
            "[DB] Snapshot: {} customers, {} items, {} reviews",
            customers.len(),
            items.len(),
            reviews.len()
        );
        SchemaGraph::from_rows(customers, items, reviews)
    }

    // The customer, its reviews and the items those reviews point at
    pub async fn customer_subgraph(&self, id: i64) -> Result<SchemaGraph> {
        let conn = self.conn.lock().await;
        let customer = fetch_customer(&conn, id)?;
        let reviews = fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM reviews WHERE customer_id = ? ORDER BY id",
                REVIEW_COLUMNS
            ),
            Some(id),
            review_from_row,
        )?;
        let items = fetch_all(
            &conn,
            "SELECT DISTINCT i.id, i.name, i.price
             FROM items i
             JOIN reviews r ON r.item_id = i.id
             WHERE r.customer_id = ?
             ORDER BY i.id",
            Some(id),
            item_from_row,
        )?;
        SchemaGraph::from_rows(vec![customer], items, reviews)
    }

    // The item, its reviews and the customers who wrote them
    pub async fn item_subgraph(&self, id: i64) -> Result<SchemaGraph> {
        let conn = self.conn.lock().await;
        let item = fetch_item(&conn, id)?;
        let reviews = fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM reviews WHERE item_id = ? ORDER BY id",
                REVIEW_COLUMNS
            ),
            Some(id),
            review_from_row,
        )?;
        let customers = fetch_all(
            &conn,
            "SELECT DISTINCT c.id, c.name
             FROM customers c
             JOIN reviews r ON r.customer_id = c.id
             WHERE r.item_id = ?
             ORDER BY c.id",
            Some(id),
            customer_from_row,
        )?;
        SchemaGraph::from_rows(customers, vec![item], reviews)
    }

    // The review and the customer and item it links
    pub async fn review_subgraph(&self, id: i64) -> Result<SchemaGraph> {
        let conn = self.conn.lock().await;
        let review = fetch_review(&conn, id)?;
        let customers = fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM customers
                 WHERE id = (SELECT customer_id FROM reviews WHERE id = ?)",
                CUSTOMER_COLUMNS
            ),
            Some(id),
            customer_from_row,
        )?;
        let items = fetch_all(
            &conn,
            &format!(
                "SELECT {} FROM items
                 WHERE id = (SELECT item_id FROM reviews WHERE id = ?)",
                ITEM_COLUMNS
            ),
            Some(id),
            item_from_row,
        )?;
        SchemaGraph::from_rows(customers, items, vec![review])
    }

    // Serialization only loads the rows the default rules let through, so a
    // dangling review elsewhere in the store does not affect this record
    pub async fn serialize_customer(&self, id: i64, rules: SerializeRules) -> Result<Value> {
        let graph = self.customer_subgraph(id).await?;
        Serializer::new(&graph).with_rules(rules).customer(id)
    }

    pub async fn serialize_item(&self, id: i64, rules: SerializeRules) -> Result<Value> {
        let graph = self.item_subgraph(id).await?;
        Serializer::new(&graph).with_rules(rules).item(id)
    }

    pub async fn serialize_review(&self, id: i64, rules: SerializeRules) -> Result<Value> {
        let graph = self.review_subgraph(id).await?;
        Serializer::new(&graph).with_rules(rules).review(id)
    }
}
