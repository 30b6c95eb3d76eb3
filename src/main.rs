// src/main.rs
use clap::{Parser, ValueEnum};
use std::error::Error;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use socks5_forward::{Context, NoMethodPolicy, ServerConfig, handle_connection};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    /// answer [5, 0xFF] then close
    Reply,
    /// close without answering
    Drop,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0")]
    ip: String,

    /// Listen port
    #[arg(short, long, default_value_t = 1080)]
    port: u16,

    /// Timeout for reading the handshake and the request (seconds)
    #[arg(long, default_value_t = 5)]
    handshake_timeout: u64,

    /// Timeout for resolving a domain destination (seconds)
    #[arg(long, default_value_t = 5)]
    resolve_timeout: u64,

    /// Timeout for connecting to the destination (seconds)
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Behaviour when the client offers no acceptable method
    #[arg(long, value_enum, default_value_t = Policy::Reply)]
    no_method_policy: Policy,

    /// Send requests for 127.0.0.1 to this host instead
    #[arg(long)]
    redirect_loopback: Option<IpAddr>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            handshake_timeout: Duration::from_secs(self.handshake_timeout),
            resolve_timeout: Duration::from_secs(self.resolve_timeout),
            connect_timeout: Duration::from_secs(self.timeout),
            no_method_policy: match self.no_method_policy {
                Policy::Reply => NoMethodPolicy::Reply,
                Policy::Drop => NoMethodPolicy::Drop,
            },
            redirect_loopback: self.redirect_loopback,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let config = args.server_config();
    if let Some(target) = config.redirect_loopback {
        info!("redirecting 127.0.0.1 to {}", target);
    }
    let ctx = Arc::new(Context::from_config(config));

    let addr = format!("{}:{}", args.ip, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("SOCKS5 Server running on {}", addr);

    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("accept failed: {}", e);
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            }
        };
        info!("accepted connection from {}", addr);

        tokio::spawn(handle_connection(socket, addr, ctx.clone()));
    }
}
