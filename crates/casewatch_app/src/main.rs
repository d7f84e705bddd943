use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Result};
use casewatch_app::cli::{Cli, Command};
use casewatch_app::config::{self, AppConfig, Environment};
use casewatch_app::render::{summary_line, TransitionPrinter};
use casewatch_core::{CaseId, ErrorKind, StatusView};
use casewatch_engine::{
    CaseListObserver, ReqwestStatusClient, StaticSession, StatusClient, StatusObserver,
};
use casewatch_logging::{watch_debug, watch_info, watch_warn};
use chrono::Local;
use clap::Parser;
use tokio::sync::{broadcast, mpsc};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(&cli.config, &cli.overrides(), Environment::from_process())?;
    if !casewatch_logging::initialize(config.log, cli.log_level(), &config.log_file) {
        eprintln!("Warning: logging is not available for this run");
    }
    match config.source.as_ref() {
        Some(path) => watch_info!("loaded config from {}", path.display()),
        None => watch_debug!("no config file at {}", cli.config.display()),
    }

    if config.token.is_none() {
        watch_warn!("no token configured; requests will fail with an auth error");
    }
    let session = Arc::new(StaticSession::new(config.token.clone()));
    let client: Arc<dyn StatusClient> =
        Arc::new(ReqwestStatusClient::new(config.client.clone(), session.clone())?);

    match cli.command {
        Command::Watch { case_ids, .. } => watch_cases(&config, client, session, case_ids).await,
        Command::List { once, .. } => list_cases(&config, client, once).await,
    }
}

async fn watch_cases(
    config: &AppConfig,
    client: Arc<dyn StatusClient>,
    session: Arc<StaticSession>,
    case_ids: Vec<String>,
) -> Result<()> {
    let (view_tx, mut view_rx) = mpsc::unbounded_channel::<StatusView>();
    let mut observers = Vec::new();
    let mut pending: HashSet<CaseId> = HashSet::new();

    for raw in case_ids {
        let case_id = CaseId::new(raw);
        if !pending.insert(case_id.clone()) {
            continue;
        }
        // No change-feed provider is wired into the CLI, so each case polls.
        let observer =
            StatusObserver::spawn(client.clone(), session.clone(), None, config.observer.clone());
        let mut transitions = observer.transitions();
        let view_tx = view_tx.clone();
        tokio::spawn(async move {
            loop {
                let view = match transitions.recv().await {
                    Ok(view) => view,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        watch_warn!("skipped {} status views", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if view_tx.send(view).is_err() {
                    break;
                }
            }
        });
        observer.subscribe(case_id);
        observers.push(observer);
    }
    drop(view_tx);
    watch_info!("watching {} case(s)", observers.len());

    let mut printer = TransitionPrinter::new();
    let mut auth_failed = false;
    while !pending.is_empty() {
        let view = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                watch_info!("interrupted");
                break;
            }
            view = view_rx.recv() => match view {
                Some(view) => view,
                None => break,
            },
        };
        if let Some(line) = printer.observe(&view, Local::now()) {
            println!("{line}");
        }
        let Some(case_id) = view.case_id.as_ref() else {
            continue;
        };
        let finished = view
            .status
            .as_ref()
            .is_some_and(|status| status.status.is_terminal());
        let halted = !view.is_polling
            && !view.is_loading
            && view.error.as_ref().is_some_and(|err| err.kind == ErrorKind::Auth);
        if finished || halted {
            auth_failed |= halted;
            pending.remove(case_id);
        }
    }

    for observer in observers {
        observer.shutdown();
    }
    if auth_failed {
        bail!("authentication failed; check the token");
    }
    Ok(())
}

async fn list_cases(config: &AppConfig, client: Arc<dyn StatusClient>, once: bool) -> Result<()> {
    let observer = CaseListObserver::spawn(client, config.list);
    let mut changes = observer.changes();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                watch_info!("interrupted");
                return Ok(());
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
        }
        let view = changes.borrow_and_update().clone();
        if view.is_loading {
            continue;
        }
        println!("{}", summary_line(&view, Local::now()));
        if let Some(error) = view.error.as_ref() {
            if error.kind == ErrorKind::Auth {
                bail!("authentication failed: {}", error.message);
            }
        }
        if once {
            return Ok(());
        }
    }
}
