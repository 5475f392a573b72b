use std::fs;
use std::net::TcpListener;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use deskcast_protocol::config::Config;
use tracing::{error, info, warn};

mod audio_loop;
mod control;
mod frontdoor;
mod scheduler;
mod sender;
mod session;

use frontdoor::Outcome;
use session::Session;

#[derive(Parser)]
#[command(name = "deskcast-server", about = "Low-latency browser-accessible remote desktop server")]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address (IP), overrides config
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides config
    #[arg(long)]
    port: Option<u16>,

    /// Target frame rate, overrides config
    #[arg(long)]
    fps: Option<u32>,

    /// Video bitrate in bits per second, overrides config
    #[arg(long)]
    video_bitrate: Option<u32>,

    /// Directory static files are served from, overrides config
    #[arg(long)]
    web_root: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deskcast_server=info,deskcast_video=info,deskcast_audio=info,deskcast_display=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {config_path}"))?;
        Config::from_toml_str(&content).with_context(|| format!("failed to parse config file: {config_path}"))?
    } else {
        Config::default()
    };

    if let Some(host) = args.host {
        config.bind_host = host;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(bitrate) = args.video_bitrate {
        config.video_bitrate = bitrate;
    }
    if let Some(web_root) = args.web_root {
        config.web_root = web_root;
    }

    info!(
        host = %config.bind_host,
        port = config.bind_port,
        fps = config.fps,
        video_bitrate = config.video_bitrate,
        capture = ?config.capture_rect,
        "deskcast server starting"
    );

    let addr = format!("{}:{}", config.bind_host, config.bind_port);
    let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, Some(socket2::Protocol::TCP))
        .with_context(|| "failed to create TCP socket")?;
    socket.set_reuse_address(true).with_context(|| "failed to set SO_REUSEADDR")?;
    let sock_addr: std::net::SocketAddr = addr.parse().with_context(|| format!("invalid bind address {addr}"))?;
    socket.bind(&sock_addr.into()).with_context(|| format!("failed to bind on {addr}"))?;
    socket.listen(128).with_context(|| "failed to listen")?;
    let listener: TcpListener = socket.into();

    info!("listening on {addr}");

    let web_root = PathBuf::from(&config.web_root);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                error!("accept error: {e}");
                continue;
            }
        };

        let peer = stream.peer_addr().ok();
        let config = config.clone();
        let web_root = web_root.clone();

        std::thread::spawn(move || match frontdoor::handle_connection(stream, &web_root) {
            Ok(Outcome::Upgraded(ws)) => {
                info!(?peer, "viewer connected");
                match Session::spawn(ws, config) {
                    Ok(session) => session.wait(),
                    Err(e) => error!(?peer, "failed to start session: {e}"),
                }
                info!(?peer, "viewer disconnected");
            }
            Ok(Outcome::Served) => {}
            Err(e) => warn!(?peer, "connection error: {e}"),
        });
    }

    Ok(())
}
