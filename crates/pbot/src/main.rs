use std::sync::Arc;

use pbot_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), pbot_core::Error> {
    pbot_core::logging::init("pbot")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        model = %cfg.gemini_model,
        followup_probability = cfg.followup.initial_probability,
        "configuration loaded"
    );

    pbot_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| pbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
