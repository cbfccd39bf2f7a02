use std::sync::Arc;

use clap::Parser;
use feedgate::config::{Args, FeedConfig};
use feedgate::server::FeedServer;
use feedgate::{FeedContext, FeedService};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();
    let config = FeedConfig::from_args(&args);

    println!("--- [feedgate] ---");
    println!("Worker Threads: {}", config.worker_threads);
    println!("Upstream Timeout: {}ms", config.upstream_timeout.as_millis());
    println!(
        "Repeat After: new faces {}s, social {}s, chat pull-again {}s",
        config.repeat.new_faces, config.repeat.social, config.repeat.chat_pull_again
    );
    println!("------------------");

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime")
        .block_on(async_main(config));
}

async fn async_main(config: FeedConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,feedgate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let addr = config.addr.clone();
    for (kind, url) in &config.endpoints.shards {
        tracing::info!("shard [{}] -> {}", kind, url);
    }

    let ctx = Arc::new(FeedContext::connect(config).expect("Failed to build upstream clients"));
    let server = FeedServer::new(FeedService::new(ctx));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("ctrl-c handler unavailable, serving until killed");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run(&addr, shutdown).await {
        tracing::error!("server stopped: {}", e);
        std::process::exit(1);
    }
    println!("Shutting down.");
}
