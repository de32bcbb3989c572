//! Interactive inspector driven by commands on stdin

use super::{parse_kind, shutdown_signal};
use anyhow::Result;
use chissl_common::{EntityRef, FilterKind};
use chissl_inspect::api::CaptureApi;
use chissl_inspect::inspector::{InspectorHost, InspectorSession, RenderMode, ViewMode};
use chissl_inspect::scheduler::RefreshScheduler;
use chissl_inspect::terminal::TerminalView;
use console::style;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  live                     start the live stream
  stop                     stop the live stream
  clear                    clear live output
  recent                   reload recent traffic
  filter all|request|response
  pretty | raw             switch history rendering
  tab live|recent          switch tab
  auto <secs>|off          periodically reload recent traffic
  open <kind> <id>         inspect another entity
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    StartLive,
    StopLive,
    ClearLive,
    Refresh,
    Filter(FilterKind),
    Render(RenderMode),
    Tab(ViewMode),
    AutoRefresh(Option<Duration>),
    Open(EntityRef),
    Help,
    Quit,
}

fn parse_action(line: &str) -> Result<Option<Action>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let action = match (command, arg) {
        ("live", None) => Action::StartLive,
        ("stop", None) => Action::StopLive,
        ("clear", None) => Action::ClearLive,
        ("recent" | "refresh", None) => Action::Refresh,
        ("filter", Some(filter)) => {
            Action::Filter(filter.parse().map_err(|e| format!("{}", e))?)
        }
        ("pretty", None) => Action::Render(RenderMode::Pretty),
        ("raw", None) => Action::Render(RenderMode::Raw),
        ("tab", Some("live")) => Action::Tab(ViewMode::Live),
        ("tab", Some("recent")) => Action::Tab(ViewMode::Recent),
        ("auto", Some("off")) => Action::AutoRefresh(None),
        ("auto", Some(secs)) => {
            let secs: u64 = secs
                .parse()
                .map_err(|_| format!("invalid interval: {}", secs))?;
            if secs == 0 {
                Action::AutoRefresh(None)
            } else {
                Action::AutoRefresh(Some(Duration::from_secs(secs)))
            }
        }
        ("open", Some(kind)) => {
            let id = words.next().ok_or("usage: open <kind> <id>")?;
            let kind = parse_kind(kind).map_err(|e| format!("{:#}", e))?;
            Action::Open(EntityRef::new(kind, id))
        }
        ("help" | "?", None) => Action::Help,
        ("quit" | "exit" | "q", None) => Action::Quit,
        _ => return Err(format!("unknown command: {} (try `help`)", line.trim())),
    };

    if words.next().is_some() && !matches!(action, Action::Open(_)) {
        return Err(format!("unexpected arguments: {}", line.trim()));
    }
    Ok(Some(action))
}

pub async fn run(
    api: CaptureApi,
    entity: EntityRef,
    capacity: usize,
    render_mode: RenderMode,
) -> Result<()> {
    cliclack::intro(style(" chissl inspect ").on_cyan().black().to_string())?;
    cliclack::log::info("Type `help` for commands, `quit` or Ctrl+C to exit")?;

    let view = Arc::new(TerminalView::new(ViewMode::Recent));
    let mut host = InspectorHost::new(
        Arc::new(api),
        view.clone(),
        RefreshScheduler::new(),
        capacity,
    );

    host.open(entity).await;
    if render_mode != RenderMode::default() {
        if let Some(session) = host.session() {
            session.set_render_mode(render_mode);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => line?,
        };
        // stdin closed
        let Some(line) = line else { break };

        let action = match parse_action(&line) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{}", style(msg).yellow());
                continue;
            }
        };

        match action {
            Action::Quit => break,
            Action::Help => println!("{}", HELP),
            Action::Open(entity) => {
                host.open(entity).await;
            }
            action => match host.session_mut() {
                Some(session) => apply(session, &view, action).await,
                None => break,
            },
        }
    }

    host.close().await;
    host.scheduler().stop_all();
    cliclack::outro("Inspector closed")?;
    Ok(())
}

async fn apply(session: &mut InspectorSession, view: &TerminalView, action: Action) {
    match action {
        Action::StartLive => {
            session.show(ViewMode::Live);
            session.start_live().await;
        }
        Action::StopLive => session.stop_live().await,
        Action::ClearLive => session.clear_live(),
        Action::Refresh => {
            session.show(ViewMode::Recent);
            // Failures are rendered by the view
            let _ = session.refresh_recent().await;
        }
        Action::Filter(filter) => {
            let _ = session.set_filter(filter).await;
        }
        Action::Render(mode) => session.set_render_mode(mode),
        Action::Tab(tab) => {
            session.show(tab);
            match tab {
                ViewMode::Live => view.replay(&session.live_entries()),
                ViewMode::Recent => {
                    if let Some(output) = session.recent_output() {
                        println!("{}", output);
                    }
                }
            }
        }
        Action::AutoRefresh(interval) => {
            session.auto_refresh_recent(interval);
            match interval {
                Some(interval) => println!("Reloading every {}s", interval.as_secs()),
                None => println!("Auto refresh off"),
            }
        }
        Action::Open(_) | Action::Help | Action::Quit => {}
    }
}
