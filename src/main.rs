use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chocohost::wasm::imports::AssertMode;
use chocohost::wasm::output::stdout_sink;
use chocohost::{ConfigOverrides, HostConfig, HostRuntime};

#[derive(Parser)]
#[command(name = "chocohost", about = "Run a compiled ChocoPy WebAssembly module.")]
struct Cli {
    /// Path to the guest module (.wasm binary or .wat text)
    module: PathBuf,

    /// Initial linear memory size in 64 KiB pages
    #[arg(long)]
    initial_pages: Option<u32>,

    /// Maximum linear memory size in 64 KiB pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// What a failing guest assertion does: halt or warn
    #[arg(long)]
    assert_mode: Option<AssertMode>,

    /// Explicit config file (YAML), applied over user and project config
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the guest; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chocohost=warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = HostConfig::load(cli.config.as_deref())?;
    config.apply_overrides(&ConfigOverrides {
        initial_pages: cli.initial_pages,
        maximum_pages: cli.max_pages,
        assert_mode: cli.assert_mode,
    });

    let runtime = HostRuntime::new(config)?;
    let guest = runtime.load_module_from_path(&cli.module)?;
    info!("running {}", guest.name());

    runtime.run_async(guest, stdout_sink()).await?;
    Ok(())
}
