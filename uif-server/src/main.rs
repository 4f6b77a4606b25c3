use clap::Parser;
use log::{error, info};
use uif_sync::server::{ServerConfig, SyncServer};

#[derive(Parser)]
#[command(name = "uif-server")]
#[command(about = "Serves a shared UI object tree to remote clients and renderers", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:3012")]
    bind: String,

    /// Request path that marks a connection as a renderer
    #[arg(long, default_value = "/render")]
    render_path: String,

    /// Acknowledge every applied transaction
    #[arg(long)]
    acks: bool,

    /// Messages buffered per session and per renderer
    #[arg(long, default_value_t = 256)]
    queue_capacity: usize,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind,
            render_path: self.render_path,
            outbound_capacity: self.queue_capacity,
            feed_capacity: self.queue_capacity,
            send_acks: self.acks,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Cli::parse().into_config();
    info!("Starting uif-server on {}...", config.bind_addr);
    let server = SyncServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    let stats = server.stats().await;
    let engine = server.engine().stats().await;
    info!(
        "{} connections, {} messages ({} bytes), {} malformed",
        stats.total_connections, stats.total_messages, stats.total_bytes, stats.malformed_messages
    );
    info!(
        "{} transactions applied, {} rejected; {} events delivered, {} dropped; {} renderer resyncs",
        engine.transactions_applied,
        engine.transactions_rejected,
        engine.events_delivered,
        engine.events_dropped,
        engine.feed.resyncs
    );
}
