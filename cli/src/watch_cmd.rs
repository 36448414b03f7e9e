//! `bundlesync watch`: follow one bundle and print what changes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bundlesync_backend_client::BackendClient;
use bundlesync_core::BundleId;
use bundlesync_core::BundleMetadataView;
use bundlesync_core::BundleSnapshot;
use bundlesync_core::SyncConfig;
use bundlesync_core::SyncEngine;
use bundlesync_core::ViewState;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct WatchArgs {
    /// Bundle to follow
    #[arg(value_name = "BUNDLE_ID")]
    pub bundle_id: String,

    /// Backend base URL (overrides config and BUNDLESYNC_SERVER)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Config file (default: ~/.config/bundlesync/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Polling interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Exit once the bundle is terminal and no fetch is outstanding
    #[arg(long)]
    pub until_settled: bool,

    /// Print every snapshot as one JSON line
    #[arg(long)]
    pub json: bool,
}

pub async fn run_watch(args: WatchArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    tracing::info!(server = %config.server_url, bundle_id = %args.bundle_id, "watching bundle");

    let backend = BackendClient::new(&config).context("failed to build HTTP client")?;
    let engine = SyncEngine::new(Arc::new(backend), config).spawn();
    let mut snapshots = engine.subscribe();
    engine.set_bundle(args.bundle_id.as_str())?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut previous: Option<Arc<BundleSnapshot>> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&snapshots.borrow_and_update());
                if snapshot.bundle_id.is_none() {
                    continue;
                }
                if args.json {
                    println!("{}", serde_json::to_string(snapshot.as_ref())?);
                } else {
                    print!("{}", render_human(previous.as_deref(), &snapshot));
                }
                if args.until_settled && snapshot.is_settled() {
                    break;
                }
                previous = Some(snapshot);
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn resolve_config(args: &WatchArgs) -> anyhow::Result<SyncConfig> {
    let mut config = match &args.config {
        Some(path) => SyncConfig::load_explicit(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SyncConfig::load().context("failed to load config")?,
    };
    if let Some(server) = &args.server {
        config.server_url = server.clone();
    }
    if let Some(interval_ms) = args.interval_ms {
        config.poll_interval_ms = interval_ms;
    }
    config.validate()?;
    Ok(config)
}

/// Status line plus any output that changed since `previous`.
fn render_human(previous: Option<&BundleSnapshot>, current: &BundleSnapshot) -> String {
    let mut out = String::new();

    let id = current
        .bundle_id
        .as_ref()
        .map(BundleId::as_str)
        .unwrap_or("-");
    let status = match current.view() {
        ViewState::Loading => "loading".to_string(),
        ViewState::Restricted => "private bundle, contents hidden".to_string(),
        ViewState::Ready => current
            .metadata
            .as_ref()
            .and_then(|m| m.state.as_ref())
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string()),
    };
    let name = current
        .metadata
        .as_ref()
        .and_then(BundleMetadataView::name)
        .map(|name| format!(" ({name})"))
        .unwrap_or_default();
    let phase = if current.polling { "polling" } else { "settled" };
    out.push_str(&format!("[{id}]{name} {status} [{phase}]\n"));

    let previous_errors = previous.map(|p| p.errors.len()).unwrap_or_default();
    for record in current.errors.iter().skip(previous_errors) {
        out.push_str(&format!("  error ({}): {}\n", record.kind.as_str(), record.message));
    }

    if current.is_restricted() {
        return out;
    }
    let sections = [
        ("contents", &current.content.file_contents, previous.map(|p| &p.content.file_contents)),
        ("stdout", &current.content.stdout, previous.map(|p| &p.content.stdout)),
        ("stderr", &current.content.stderr, previous.map(|p| &p.content.stderr)),
    ];
    for (label, value, before) in sections {
        if let Some(text) = value
            && before != Some(value)
        {
            out.push_str(&format!("--- {label} ---\n{text}"));
            if !text.ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}
