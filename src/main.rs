use anyhow::Result;
use async_std::task;
use log::*;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::env;
use std::time::Duration;

use fetch_worker::config::WorkerConfig;
use fetch_worker::fetch::Random;
use fetch_worker::fetch_worker::supervisor::Supervisor;
use fetch_worker::VERSION;

fn init_logging() -> Result<()> {
    let level = env::var("FETCH_LOG_LEVEL")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:5})} {T} {t} - {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))?;

    log4rs::init_config(config)?;

    Ok(())
}

#[async_std::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = WorkerConfig::from_env();
    let rounds: u32 = env::var("FETCH_ROUNDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    info!("fetch worker version: {}, config: {:?}", VERSION, config);

    let mut supervisor = Supervisor::new();
    let worker = supervisor.start(Random::default(), config)?;

    for round in 1..=rounds {
        task::sleep(Duration::from_secs(1)).await;

        let probe = fastrand::i64(1..=100);
        let seen = worker.seen_number(probe).await?;
        info!("round {}: seen {}? {}", round, probe, seen);

        for status in supervisor.status().await {
            println!("{}", serde_json::to_string(&status)?);
        }
    }

    supervisor.shutdown().await?;

    Ok(())
}
