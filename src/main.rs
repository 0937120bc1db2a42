use std::sync::Arc;

use color_eyre::eyre::Result;
use tasklist::api::ApiClient;
use tasklist::app::{Flags, TaskApp};
use tasklist::config::Config;
use tasklist::logging;
use tasklist::runtime::Runtime;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = Config::from_env()?;
    if let Some(path) = &config.log_file {
        logging::init(path)?;
    }
    info!(base_url = %config.api.base_url, frame_rate = config.frame_rate, "starting");

    let client = Arc::new(ApiClient::with_config(config.api)?);
    let runtime = Runtime::<TaskApp>::new(Flags::new(client));

    let mut terminal = ratatui::init();
    let result = runtime.run(&mut terminal, config.frame_rate).await;
    ratatui::restore();

    result
}
