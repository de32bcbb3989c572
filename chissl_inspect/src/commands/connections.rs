//! List capture connections recorded for a tunnel

use anyhow::{Context, Result};
use chissl_inspect::api::CaptureApi;
use console::style;

pub async fn run(api: CaptureApi, tunnel_id: &str) -> Result<()> {
    let connections = api
        .list_connections(tunnel_id)
        .await
        .with_context(|| format!("Failed to list connections for tunnel {}", tunnel_id))?;

    if connections.is_empty() {
        println!("No captured connections for tunnel {}.", tunnel_id);
        return Ok(());
    }

    println!("{}", style(format!("CONNECTIONS ({})", connections.len())).dim());
    for connection in connections {
        println!("  {}", connection);
    }
    Ok(())
}
