use anyhow::Result;
use qasynda_chat::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    qasynda_chat::init_tracing(&config.rust_log);

    qasynda_chat::run(config).await
}
