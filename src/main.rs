use anyhow::Context as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg: blockcast_rx::config::Config =
        blockcast_rx::config_io::load_or_create_config("config.toml")
            .await
            .context("unable to read or create config.toml")?;

    blockcast_rx::config::init_tracing(&cfg);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "blockcast-rx booted");

    blockcast_rx::app::run(cfg).await?;
    Ok(())
}
