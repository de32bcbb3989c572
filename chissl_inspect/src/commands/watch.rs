//! Dashboard stats, refreshed until Ctrl+C

use super::shutdown_signal;
use anyhow::Result;
use chissl_inspect::api::CaptureApi;
use chissl_inspect::scheduler::RefreshScheduler;
use chissl_inspect::stats::{start_dashboard_stats, stop_dashboard_stats};
use chissl_inspect::terminal::StatsLine;
use console::style;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(api: CaptureApi, interval: Duration) -> Result<()> {
    cliclack::intro(style(" chissl stats ").on_cyan().black().to_string())?;
    cliclack::log::info(format!(
        "Refreshing {} every {}s, Ctrl+C to stop",
        style(api.base_url()).cyan(),
        interval.as_secs()
    ))?;

    let scheduler = RefreshScheduler::new();
    start_dashboard_stats(&scheduler, api, Arc::new(StatsLine), interval);

    shutdown_signal().await;

    stop_dashboard_stats(&scheduler);
    cliclack::outro("Stopped")?;
    Ok(())
}
