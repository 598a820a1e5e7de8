//! Standalone debug server
//!
//! Runs the adapter against an empty VM image, which is enough to exercise
//! the wire protocol and editor integration without a running game. Embedded
//! hosts construct [`zephyr_dap::Debugger`] directly instead.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zephyr_dap::{Debugger, DebugServer, ServerConfig};
use zephyr_vm::{MemoryFs, MemoryHeap, SingleStackRegistry, VmImage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[clap(long, env = "ZEPHYR_DAP_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[clap(long, env = "ZEPHYR_DAP_PORT", default_value_t = zephyr_dap::DEFAULT_PORT)]
    port: u16,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        host: args.host,
        port: args.port,
    };

    let debugger = Arc::new(Debugger::new(
        Arc::new(VmImage::default()),
        Arc::new(MemoryHeap::new()),
        Arc::new(MemoryFs::new()),
        Arc::new(SingleStackRegistry::new()),
    ));
    let server = DebugServer::bind(debugger, &config)
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    server.serve().context("serving debug clients")?;
    Ok(())
}
