use anyhow::Context as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cfg: magnet_stream::config::Config =
        magnet_stream::config_io::load_or_create_config("config.toml")
            .await
            .context("unable to read or create config.toml")?;

    magnet_stream::config::init_tracing(&cfg);
    cfg.apply_env_overrides();
    tracing::info!("magnet-stream booted");

    magnet_stream::app::run(cfg).await
}
