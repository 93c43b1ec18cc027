// external packages
use futures_util::StreamExt;
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    sync::CancellationToken,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use spouse_draw::{
    common::{conf_from_file, LoggingConf, Settings, DEFAULT_CONFIG},
    plugins::spouse::{
        on_message,
        process::Event,
        reset::SystemClock,
    },
    Spouse,
};

// console host: one event per stdin line, `<user> <group|-> <message>`
#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());

    let settings: Settings = match conf_from_file(&path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    init_tracing(&settings.logging);
    info!(config = %path, "booting...");

    let spouse = Spouse::init(&settings).await;

    let shutdown = CancellationToken::new();
    let reset = tokio::spawn(spouse.scheduler(SystemClock).run(shutdown.clone()));

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("shutdown signal received");
        ctrl_c.cancel();
    });

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    info!("ready");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next() => line,
        };

        match line {
            Some(Ok(line)) => {
                let Some(event) = Event::from_line(&line) else {
                    continue;
                };
                if let Some(reply) = on_message(&spouse, &event).await {
                    println!("{reply}");
                }
            }
            Some(Err(e)) => warn!(error = %e, "unreadable input line"),
            None => break,
        }
    }

    shutdown.cancel();
    if let Err(e) = reset.await {
        warn!(error = %e, "reset scheduler task failed");
    }
}

fn init_tracing(config: &LoggingConf) {
    let level = config.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
