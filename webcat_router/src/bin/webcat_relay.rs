use anyhow::Context;
use clap::Parser;
use crossbeam_channel::bounded;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;
use webcat_router::config::{self, DEFAULT_WS_ADDR, ENV_OPTIONS_FILE, ENV_WS_ADDR};
use webcat_router::{MainLoop, NetworkThread, RelayConfig, TargetClickSearchMode};

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Relays segment clicks and selections from CAT-tool pages to search pages.
#[derive(Parser, Debug)]
#[command(name = "webcat_relay")]
struct Args {
    #[arg(long, env = ENV_WS_ADDR, default_value = DEFAULT_WS_ADDR)]
    addr: String,

    /// JSON file with search options (targetClickSearchMode, targetSelectSearchEnabled).
    #[arg(long, value_name = "PATH", env = ENV_OPTIONS_FILE)]
    options: Option<PathBuf>,

    #[arg(long, value_name = "MODE")]
    target_click_search_mode: Option<TargetClickSearchMode>,

    #[arg(long, value_name = "BOOL")]
    target_select_search_enabled: Option<bool>,

    /// Write the bound address here once listening (useful with port 0).
    #[arg(long, value_name = "PATH")]
    addr_file: Option<PathBuf>,

    #[arg(long)]
    run_for_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut options = config::load_options(args.options.as_deref(), |k| std::env::var(k).ok())?;
    if let Some(mode) = args.target_click_search_mode {
        options.target_click_search_mode = mode;
    }
    if let Some(enabled) = args.target_select_search_enabled {
        options.target_select_search_enabled = enabled;
    }
    let relay = RelayConfig {
        listen_addr: args.addr,
        options,
    };

    let (in_tx, in_rx) = bounded(webcat_router::INBOUND_CAP);
    let (out_tx, out_rx) = bounded(webcat_router::OUTBOUND_CAP);

    let net = NetworkThread::spawn_with_addr(&relay.listen_addr, in_tx, out_rx)?;

    if let Some(path) = &args.addr_file {
        fs::write(path, net.listen_addr().to_string())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    info!(
        addr = %net.listen_addr(),
        target_click_search_mode = %relay.options.target_click_search_mode,
        target_select_search_enabled = relay.options.target_select_search_enabled,
        "webcat relay listening"
    );

    let run_for = args.run_for_ms.map(Duration::from_millis);
    let mut main_loop = MainLoop::new(in_rx, out_tx, relay.options);

    let start = Instant::now();
    loop {
        if main_loop.tick() == 0 {
            thread::sleep(IDLE_SLEEP);
        }
        if let Some(max) = run_for {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    net.shutdown();
    Ok(())
}
