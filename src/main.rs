use anyhow::Result;
use clap::Parser;
use log4rs::config::Deserializers;
use veil_proxy::{config::ProxyConfig, config::LOG4RS_CONFIG_FILE_PATH, server::ProxyServer};

#[tokio::main]
async fn main() -> Result<()> {
    log4rs::init_file(LOG4RS_CONFIG_FILE_PATH, Deserializers::default())?;

    let config = ProxyConfig::parse();
    let server = ProxyServer::bind(&config).await?;
    server.run().await
}
