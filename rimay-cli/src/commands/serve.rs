//! `rimay serve`: run the HTTP server.

use console::style;
use tracing::warn;

use rimay_core::config::AppConfig;
use rimay_core::error::RimayResult;

pub async fn run(mut config: AppConfig, bind: Option<String>) -> RimayResult<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if !config.push.is_configured() {
        warn!("push credentials not configured; incident notifications will not be delivered");
    }

    println!(
        "  {} Rimay Alert listening on {}",
        style(">>").cyan().bold(),
        style(&config.server.bind_address).bold()
    );
    rimay_server::serve(config).await
}
