//! viewscope: dump the focused hierarchy of a running viewscope host.
//!
//! Usage:
//!   viewscope                       tag grammar from 127.0.0.1:4545
//!   viewscope --json                object grammar
//!   viewscope --port 5000 print     explicit port and command
//!   viewscope --config server.json  host and port from a server config

mod client;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use viewscope_server::{Grammar, ServerConfig, PRINT_COMMAND};

use client::InspectorClient;

/// Dump the view hierarchy of a running viewscope host
#[derive(Parser, Debug)]
#[command(name = "viewscope")]
#[command(about = "Dump the view hierarchy of a running viewscope host")]
struct Args {
    /// Server config (JSON) to take host and port from
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to connect to [default: 127.0.0.1]
    #[arg(long)]
    host: Option<String>,

    /// Port to connect to [default: 4545]
    #[arg(short, long)]
    port: Option<u16>,

    /// Request the object grammar instead of tags
    #[arg(long)]
    json: bool,

    /// Connect and read timeout in seconds; 0 waits forever
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Command to send
    #[arg(default_value = PRINT_COMMAND)]
    command: String,
}

impl Args {
    /// `host:port`, flags overriding the config file overriding defaults.
    fn target(&self) -> Result<String, String> {
        let config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        let host = self.host.clone().unwrap_or(config.host);
        let port = self.port.unwrap_or(config.port);
        Ok(format!("{host}:{port}"))
    }

    fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    fn grammar(&self) -> Grammar {
        if self.json {
            Grammar::Object
        } else {
            Grammar::Tag
        }
    }
}

fn load_config(path: &Path) -> Result<ServerConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))
}

fn main() -> ExitCode {
    // Logs go to stderr so the dump on stdout stays pipeable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let target = match args.target() {
        Ok(target) => target,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = InspectorClient::new(target, args.timeout());
    tracing::debug!(addr = client.addr(), command = %args.command, "sending request");
    match client.request(&args.command, args.grammar()) {
        Ok(response) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(&response).and_then(|()| writeln!(stdout)) {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
