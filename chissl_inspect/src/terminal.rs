//! Terminal rendition of the inspector and dashboard views

use crate::error::InspectError;
use crate::inspector::render::{LIVE_PLACEHOLDER, NO_TRAFFIC};
use crate::inspector::{ConnectionState, InspectorView, LiveEntry, ViewMode};
use crate::stats::{CardUpdate, StatsView};
use chissl_common::EntityRef;
use console::style;
use std::sync::Mutex;

/// Writes inspector output to stdout.
///
/// Only the active tab is printed; live events that arrive while the recent
/// tab is showing stay in the session buffer and are replayed on switch.
pub struct TerminalView {
    tab: Mutex<ViewMode>,
    report_failures: bool,
}

impl TerminalView {
    pub fn new(tab: ViewMode) -> Self {
        Self {
            tab: Mutex::new(tab),
            report_failures: true,
        }
    }

    /// View for one-shot commands; failed loads are left to the caller
    pub fn one_shot(tab: ViewMode) -> Self {
        Self {
            tab: Mutex::new(tab),
            report_failures: false,
        }
    }

    pub fn reports_failures(&self) -> bool {
        self.report_failures
    }

    fn tab(&self) -> ViewMode {
        *self.tab.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Print a batch of buffered live entries
    pub fn replay(&self, entries: &[LiveEntry]) {
        if entries.is_empty() {
            println!("{}", style(LIVE_PLACEHOLDER).dim());
            return;
        }
        for entry in entries {
            println!("{}", entry.rendered);
        }
    }
}

/// Header line for an inspected entity, e.g. `tunnel 0123abcd`
pub fn entity_title(entity: &EntityRef) -> String {
    format!("{} {}", entity.kind.as_str(), entity.short_id())
}

fn status_style(state: ConnectionState) -> console::StyledObject<&'static str> {
    let label = state.as_str();
    match state {
        ConnectionState::Streaming => style(label).green(),
        ConnectionState::Connecting => style(label).yellow(),
        ConnectionState::Error => style(label).red(),
        ConnectionState::Idle | ConnectionState::Closed => style(label).dim(),
    }
}

impl InspectorView for TerminalView {
    fn opened(&self, entity: &EntityRef) {
        println!(
            "{} {}",
            style("Inspecting").dim(),
            style(entity_title(entity)).cyan().bold()
        );
    }

    fn live_status(&self, state: ConnectionState, detail: Option<&str>) {
        match detail {
            Some(detail) => println!("{} {}", status_style(state), style(detail).dim()),
            None => println!("{}", status_style(state)),
        }
    }

    fn live_append(&self, entry: &LiveEntry) {
        if self.tab() == ViewMode::Live {
            println!("{}", entry.rendered);
        }
    }

    fn live_cleared(&self) {
        if self.tab() == ViewMode::Live {
            println!("{}", style(LIVE_PLACEHOLDER).dim());
        }
    }

    fn recent_rendered(&self, output: &str) {
        if self.tab() != ViewMode::Recent {
            return;
        }
        if output == NO_TRAFFIC {
            println!("{}", style(output).dim());
        } else {
            println!("{}", output);
        }
    }

    fn recent_failed(&self, error: &InspectError) {
        if !self.report_failures {
            return;
        }
        eprintln!("{} {}", style("Error loading traffic:").red(), error);
    }

    fn tab_changed(&self, tab: ViewMode) {
        *self.tab.lock().unwrap_or_else(|p| p.into_inner()) = tab;
        let name = match tab {
            ViewMode::Live => "live",
            ViewMode::Recent => "recent",
        };
        println!("{}", style(format!("-- {} --", name)).dim());
    }

    fn teardown(&self) {
        tracing::debug!("Terminal view released");
    }
}

/// Prints each dashboard card as one line
pub struct StatsLine;

impl StatsView for StatsLine {
    fn card_updated(&self, update: &CardUpdate) {
        let fields: Vec<String> = update
            .fields
            .iter()
            .map(|(name, value)| format!("{}={}", style(name).dim(), value))
            .collect();
        println!(
            "{:<10} {}",
            style(update.card.title()).cyan().bold(),
            fields.join("  ")
        );
    }
}
