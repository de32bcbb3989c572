//! Dashboard stats cards refreshed through the scheduler
//!
//! Three cards: system info, tunnel stats and listener counts. A card whose
//! fetch fails shows `Error` in every field until the next successful tick.

use crate::api::CaptureApi;
use crate::error::Result;
use crate::scheduler::RefreshScheduler;
use chissl_common::constants;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler key of the system info card
pub const SYSTEM_INFO_KEY: &str = "system-info";

/// Scheduler key of the tunnel stats card
pub const TUNNEL_STATS_KEY: &str = "tunnel-stats";

/// Scheduler key of the listener stats card
pub const LISTENER_STATS_KEY: &str = "listener-stats";

const ERROR_TEXT: &str = "Error";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uptime: Option<f64>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TunnelStats {
    pub active_tunnels: u64,
    pub total_tunnels: u64,
    pub total_connections: u64,
    pub data_transferred: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenerSummary {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsCard {
    System,
    Tunnels,
    Listeners,
}

impl StatsCard {
    pub fn title(&self) -> &'static str {
        match self {
            StatsCard::System => "System",
            StatsCard::Tunnels => "Tunnels",
            StatsCard::Listeners => "Listeners",
        }
    }
}

/// New contents of one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardUpdate {
    pub card: StatsCard,
    pub fields: Vec<(&'static str, String)>,
}

/// Receives card updates; implemented by the host
pub trait StatsView: Send + Sync + 'static {
    fn card_updated(&self, update: &CardUpdate);
}

/// Human readable uptime, e.g. `2d 3h 4m` or `5m 6s`
pub fn format_uptime(seconds: f64) -> String {
    if !(seconds > 0.0) {
        return "0s".to_string();
    }
    let total = seconds.floor() as u64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Byte count in 1024-based units with at most two decimals
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

pub fn system_card(info: Option<&SystemInfo>) -> CardUpdate {
    let fields = match info {
        Some(info) => vec![
            ("version", info.version.clone().unwrap_or_else(|| "Unknown".to_string())),
            ("uptime", format_uptime(info.uptime.unwrap_or(0.0))),
            (
                "fingerprint",
                info.fingerprint.clone().unwrap_or_else(|| "Unknown".to_string()),
            ),
        ],
        None => error_fields(&["version", "uptime", "fingerprint"]),
    };
    CardUpdate {
        card: StatsCard::System,
        fields,
    }
}

pub fn tunnel_card(stats: Option<&TunnelStats>) -> CardUpdate {
    let fields = match stats {
        Some(stats) => vec![
            ("active", stats.active_tunnels.to_string()),
            ("total", stats.total_tunnels.to_string()),
            ("connections", stats.total_connections.to_string()),
            ("transferred", format_bytes(stats.data_transferred)),
        ],
        None => error_fields(&["active", "total", "connections", "transferred"]),
    };
    CardUpdate {
        card: StatsCard::Tunnels,
        fields,
    }
}

pub fn listener_card(listeners: Option<&[ListenerSummary]>) -> CardUpdate {
    let fields = match listeners {
        Some(listeners) => {
            let active = listeners
                .iter()
                .filter(|l| l.status.as_deref() == Some("active"))
                .count();
            vec![
                ("active", active.to_string()),
                ("total", listeners.len().to_string()),
            ]
        }
        None => error_fields(&["active", "total"]),
    };
    CardUpdate {
        card: StatsCard::Listeners,
        fields,
    }
}

fn error_fields(names: &[&'static str]) -> Vec<(&'static str, String)> {
    names.iter().map(|name| (*name, ERROR_TEXT.to_string())).collect()
}

/// Render the fetch outcome into the card, passing the error on
fn publish<T>(
    view: &dyn StatsView,
    result: Result<T>,
    card: impl FnOnce(Option<&T>) -> CardUpdate,
) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            view.card_updated(&card(Some(&value)));
            Ok(())
        }
        Err(err) => {
            view.card_updated(&card(None));
            Err(err.into())
        }
    }
}

/// Register the three stats pollers on `scheduler`
pub fn start_dashboard_stats(
    scheduler: &RefreshScheduler,
    api: CaptureApi,
    view: Arc<dyn StatsView>,
    interval: Duration,
) {
    {
        let api = api.clone();
        let view = view.clone();
        scheduler.start(
            SYSTEM_INFO_KEY,
            move || {
                let api = api.clone();
                let view = view.clone();
                async move {
                    let result = api.get_json::<SystemInfo>(constants::SYSTEM_PATH).await;
                    publish(view.as_ref(), result, system_card)
                }
            },
            interval,
        );
    }

    {
        let api = api.clone();
        let view = view.clone();
        scheduler.start(
            TUNNEL_STATS_KEY,
            move || {
                let api = api.clone();
                let view = view.clone();
                async move {
                    let result = api.get_json::<TunnelStats>(constants::STATS_PATH).await;
                    publish(view.as_ref(), result, tunnel_card)
                }
            },
            interval,
        );
    }

    scheduler.start(
        LISTENER_STATS_KEY,
        move || {
            let api = api.clone();
            let view = view.clone();
            async move {
                let result = api
                    .get_json::<Option<Vec<ListenerSummary>>>(constants::LISTENERS_PATH)
                    .await
                    .map(Option::unwrap_or_default);
                publish(view.as_ref(), result, |l: Option<&Vec<ListenerSummary>>| {
                    listener_card(l.map(Vec::as_slice))
                })
            }
        },
        interval,
    );
}

/// Remove the stats pollers
pub fn stop_dashboard_stats(scheduler: &RefreshScheduler) {
    for key in [SYSTEM_INFO_KEY, TUNNEL_STATS_KEY, LISTENER_STATS_KEY] {
        scheduler.stop(key);
    }
}
