use reviewstore::{logging, Database, DbConfig, SerializeRules};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        error!("reviewstore failed: {}", e);
        std::process::exit(1);
    }
}

// Open the configured database, make sure the schema exists, and dump every customer as JSON
async fn run() -> reviewstore::Result<()> {
    let config = DbConfig::from_env();
    let db = Database::open(&config)?;
    db.create_schema().await?;
    info!("Schema created successfully!");

    let mut customers = Vec::new();
    for customer in db.list_customers().await? {
        let value = db
            .serialize_customer(customer.id, SerializeRules::new())
            .await?;
        customers.push(value);
    }

    println!("{}", serde_json::to_string_pretty(&customers)?);
    Ok(())
}
