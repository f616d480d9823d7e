use fieldtrack_config::Settings;
use mongodb::{Client, Database, options::ClientOptions};
use tracing::info;

pub async fn connect(settings: &Settings) -> Result<Database, mongodb::error::Error> {
    let mut client_options = ClientOptions::parse(&settings.database.url).await?;

    if let Some(max_pool) = settings.database.max_pool_size {
        client_options.max_pool_size = Some(max_pool);
    }
    if let Some(min_pool) = settings.database.min_pool_size {
        client_options.min_pool_size = Some(min_pool);
    }

    let client = Client::with_options(client_options)?;
    let db = client.database(&settings.database.name);

    // Verify connection
    ping(&db).await?;

    info!(db = %settings.database.name, "Connected to MongoDB");

    Ok(db)
}

/// Round-trips a `ping` command; used both at startup and as the reconnect probe.
pub async fn ping(db: &Database) -> Result<(), mongodb::error::Error> {
    db.run_command(bson::doc! { "ping": 1 }).await?;
    Ok(())
}
