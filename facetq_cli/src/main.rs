use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use facetq_client::{
    menu::{MenuConfig, QueryMenu},
    orchestrator::Settlement,
    transport::{QueryTransport, ReplayTransport},
    view::ViewFlagsUpdate,
};
use facetq_common::selection::FacetSelectionEvent;
use log::{debug, info, warn};
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;

#[derive(Parser, Debug)]
struct CLIArgs {
    /// Recorded session to answer queries from
    recording: PathBuf,

    /// JSON file with a list of menu entries
    #[arg(short, long)]
    menu: Option<PathBuf>,

    /// Query for a single entry menu
    #[arg(short, long)]
    sql: Option<String>,

    /// Facet column for a single entry menu
    #[arg(short, long)]
    filter: Option<String>,

    /// Page size
    #[arg(short, long)]
    limit: Option<u64>,

    /// Simulated backend latency, in milliseconds
    #[arg(long)]
    delay: Option<u64>,

    /// Debug mode
    #[arg(short, long)]
    debug: bool,
}

const HELP: &str = "\
commands:
  show              print the active view
  toggle <value>    toggle one facet value
  all | none        select or deselect every value
  next | prev       move between pages
  reset             back to the unfiltered first page
  menu <index>      switch menu entry
  expand | collapse show all or only the top facet values
  quit";

fn load_menu(args: &CLIArgs) -> anyhow::Result<Vec<MenuConfig>> {
    if let Some(path) = &args.menu {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Unable to open menu {}", path.display()))?;
        return serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Malformed menu {}", path.display()));
    }

    match (&args.sql, &args.filter) {
        (Some(sql), Some(filter)) => Ok(vec![MenuConfig::new(sql, filter)]),
        _ => anyhow::bail!("Either --menu or both --sql and --filter are needed"),
    }
}

fn show(menu: &QueryMenu) -> anyhow::Result<()> {
    let view = menu.active();
    let config = menu.active_config();
    let snapshot = view.snapshot();

    let facets = match view.visible_facet_values(&config.filter) {
        Ok(values) => serde_json::to_value(values)?,
        Err(e) => json!(e.to_string()),
    };

    let report = json!({
        "entry": menu.active_index(),
        "title": config.title,
        "phase": format!("{:?}", snapshot.phase),
        "error": snapshot.error.as_ref().map(|e| e.to_string()),
        "request": snapshot.request,
        "totalRowCount": snapshot.result.as_ref().and_then(|r| r.total_row_count),
        "rows": snapshot.result.as_ref().map(|r| r.rows.len()),
        "unit": config.unit_description,
        "allSelected": view.is_all_filter_selected_for_facet(&config.filter),
        "facets": facets,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

async fn settle(handle: JoinHandle<Settlement>) -> anyhow::Result<()> {
    match handle.await.context("Query task failed")? {
        Settlement::Applied(phase) => debug!("Settled as {phase:?}"),
        Settlement::Stale { sequence, latest } => {
            debug!("Reply #{sequence} superseded by #{latest}")
        }
    }
    Ok(())
}

/// Run one command line. Returns false when the session should end.
async fn handle_command(menu: &mut QueryMenu, line: &str) -> anyhow::Result<bool> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(true);
    };
    let argument = parts.collect::<Vec<_>>().join(" ");
    let column = menu.active_config().filter.clone();

    let issued = match command {
        "show" => None,
        "toggle" if !argument.is_empty() => Some(
            menu.active_mut()
                .apply_facet_selection(&FacetSelectionEvent::toggle(&column, &argument)),
        ),
        "all" => Some(
            menu.active_mut()
                .apply_facet_selection(&FacetSelectionEvent::select_all(&column)),
        ),
        "none" => Some(
            menu.active_mut()
                .apply_facet_selection(&FacetSelectionEvent::deselect_all(&column)),
        ),
        "next" => Some(Ok(menu.active().next_page())),
        "prev" => Some(Ok(menu.active().previous_page())),
        "reset" => Some(Ok(menu.active().execute_initial_query_request())),
        "menu" => {
            let Ok(index) = argument.parse::<usize>() else {
                warn!("Menu index expected, got '{argument}'");
                return Ok(true);
            };
            match menu.select(index) {
                Ok(handle) => handle.map(Ok),
                Err(e) => Some(Err(e)),
            }
        }
        "expand" | "collapse" => {
            menu.active_mut().update_parent_state(ViewFlagsUpdate {
                show_all_facets: Some(command == "expand"),
            });
            None
        }
        "quit" | "exit" => return Ok(false),
        _ => {
            println!("{HELP}");
            return Ok(true);
        }
    };

    match issued {
        Some(Ok(handle)) => settle(handle).await?,
        Some(Err(e)) => warn!("{e}"),
        None => {}
    }

    show(menu)?;

    Ok(true)
}

async fn cli_main(args: CLIArgs) -> anyhow::Result<()> {
    let mut replay = ReplayTransport::open(&args.recording).with_context(|| {
        format!("Unable to read recording {}", args.recording.display())
    })?;

    info!("Loaded {} exchanges from {}", replay.len(), args.recording.display());

    if let Some(ms) = args.delay {
        replay = replay.with_delay(Duration::from_millis(ms));
    }

    let transport: Arc<dyn QueryTransport> = Arc::new(replay);
    let mut menu = QueryMenu::new(load_menu(&args)?, transport)?;

    // a custom page size applies until the next reset
    if let Some(limit) = args.limit {
        info!("Page size: {limit}");
        let request = menu.active().get_last_query_request().with_limit(limit);
        settle(menu.active().execute_query_request(request)).await?;
    }

    for handle in menu.load_all() {
        settle(handle).await?;
    }

    show(&menu)?;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if !handle_command(&mut menu, line.trim()).await? {
            break;
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli_args = CLIArgs::parse();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }

    if cli_args.debug {
        std::env::set_var("RUST_LOG", "debug")
    }

    env_logger::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()?;

    runtime.block_on(cli_main(cli_args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> QueryMenu {
        let transport: Arc<dyn QueryTransport> = Arc::new(ReplayTransport::default());
        QueryMenu::new(
            vec![
                MenuConfig::new("SELECT * FROM syn1", "name"),
                MenuConfig::new("SELECT * FROM syn2", "tissue"),
            ],
            transport,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn bad_menu_commands_keep_session() {
        let mut menu = menu();

        assert!(handle_command(&mut menu, "menu x").await.unwrap());
        assert!(handle_command(&mut menu, "menu 9").await.unwrap());
        assert_eq!(menu.active_index(), 0);

        assert!(handle_command(&mut menu, "menu 1").await.unwrap());
        assert_eq!(menu.active_index(), 1);

        assert!(!handle_command(&mut menu, "quit").await.unwrap());
    }
}
