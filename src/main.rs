use std::error::Error;

use foodgram_sdk::{filters::api, jwt::SessionKeys, Config};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("Database migrated");

    let keys = SessionKeys::new(&config.session_secret, config.session_ttl_hours)?;

    log::info!("Listening on {}", config.bind_address);
    warp::serve(api(pool, keys)).run(config.bind_address).await;

    Ok(())
}
