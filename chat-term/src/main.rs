// LineChat terminal client: one peer at a time over TCP.

mod codec;
mod config;
mod discovery;
mod engine;
mod handshake;
mod presenter;
mod shell;
mod transport;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use chat_core::LocalIdentity;
use clap::Parser;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chat with one nearby peer at a time.
#[derive(Parser, Debug)]
#[command(name = "linechat")]
#[command(version)]
struct Cli {
    /// Display name (otherwise from config, LINECHAT_NAME, or a prompt).
    #[arg(long)]
    name: Option<String>,

    /// Listener port, also the default port when dialing.
    #[arg(long)]
    port: Option<u16>,

    /// Config file instead of the default locations.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Ask once on stdin. Blank answer means the user backed out.
fn prompt_name() -> anyhow::Result<Option<String>> {
    print!("Your name: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.port = port;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let name = match args.name.or_else(|| cfg.name.clone()) {
        Some(n) => n,
        None => match prompt_name()? {
            Some(n) => n,
            None => return Ok(()),
        },
    };
    let local = LocalIdentity::new(&name).context("invalid display name")?;
    tracing::info!(name = %local, bind = %cfg.bind_addr(), "LineChat v{}", VERSION);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (presenter, approvals) = presenter::TerminalPresenter::new(cfg.auto_accept);
        let transport = transport::TcpTransport::new(cfg.bind_addr(), cfg.port);
        let scanner = discovery::StaticScanner::new(cfg.devices.clone());
        let engine = engine::ChatEngine::new(local, transport, presenter, scanner);

        println!("Welcome, {}! Type /help for commands.", engine.local());
        engine.start();

        let result = tokio::select! {
            r = shell::run(engine.clone(), approvals) => r.map_err(anyhow::Error::from),
            r = shutdown_signal() => r,
        };
        engine.shutdown().await;
        result
    })
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("linechat").chain(list.iter().copied()))
    }

    #[test]
    fn flags_are_parsed() {
        let a = args(&["--name", "alice", "--port", "9000", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(a.name.as_deref(), Some("alice"));
        assert_eq!(a.port, Some(9000));
        assert_eq!(a.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn no_flags_defers_to_config() {
        let a = args(&[]).unwrap();
        assert!(a.name.is_none() && a.port.is_none() && a.config.is_none());
    }

    #[test]
    fn version_flag_short_circuits() {
        let err = args(&["-V"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        let err = args(&["--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn bad_input_is_error() {
        assert!(args(&["--port", "lots"]).is_err());
        assert!(args(&["--port", "70000"]).is_err());
        assert!(args(&["--name"]).is_err());
        assert!(args(&["--colour"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
