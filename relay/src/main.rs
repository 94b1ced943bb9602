use anyhow::{Context, Result};
use clap::Parser;
use hopwire_core::Relayer;
use hopwire_relay::http::HttpProxyFrontend;
use hopwire_relay::socks5::Socks5Frontend;
use hopwire_relay::tcp::TcpBackend;
use hopwire_relay::wrap::{WrapBackend, WrapFrontend};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chained TCP relay whose hop-to-hop traffic looks like HTTP")]
struct Cli {
    /// Listen address of this relay.
    #[arg(short = 'l', long, env = "HOPWIRE_LISTEN", default_value = "localhost:1080")]
    listen: String,

    /// Address of the next-hop relay. When absent, this relay accepts
    /// wrapped peers and dials destinations directly.
    #[arg(short = 'n', long, env = "HOPWIRE_NEXT_HOP")]
    next_hop: Option<String>,

    /// Also serve a plain HTTP proxy on this address, feeding the same
    /// next-hop tunnel. Only meaningful together with --next-hop.
    #[arg(long, env = "HOPWIRE_HTTP_PROXY")]
    http_proxy: Option<String>,

    /// Enable debug logging.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_directive.into())
                .from_env_lossy(),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %cli.listen,
        "starting relay"
    );

    let listener = TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("failed to listen on {}", cli.listen))?;

    match cli.next_hop {
        None => {
            tracing::info!("terminal relay, dialing destinations directly");

            Relayer::new(WrapFrontend::new(listener), TcpBackend).run().await;
        }
        Some(next_hop) => {
            tracing::info!(%next_hop, "forwarding sessions to the next hop");

            if let Some(addr) = cli.http_proxy {
                let proxy_listener = TcpListener::bind(&addr)
                    .await
                    .with_context(|| format!("failed to listen on {addr}"))?;
                tracing::info!(%addr, "serving local http proxy");

                let relayer = Relayer::new(
                    HttpProxyFrontend::new(proxy_listener),
                    WrapBackend::new(next_hop.clone()),
                );
                tokio::spawn(async move { relayer.run().await });
            }

            Relayer::new(Socks5Frontend::new(listener), WrapBackend::new(next_hop))
                .run()
                .await;
        }
    }

    unreachable!("the accept loop never returns")
}
