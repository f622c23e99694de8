use aidev_api::Server;
use aidev_core::{init_tracing, ConfigManager};
use std::sync::Arc;

#[tokio::main]
async fn main() -> aidev_core::Result<()> {
    let config = Arc::new(ConfigManager::load()?);
    init_tracing(&config.config().logging);

    let server = Server::new(config)?;
    server.run().await
}
