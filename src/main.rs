//! Демонстрационный запуск брокера topicbus
//!
//! Поднимает брокер по настройкам, запускает диспетчер, регистрирует двух
//! подписчиков на тему 1 (группы 1 и 5) и публикует события в группу 1, в
//! группу 5 и во всю тему. В конце печатает статистику в JSON.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use topicbus::{init_logging, Broker, HandlerRef, Settings, TopicAddr};

const DEMO_TOPIC: u8 = 1;

#[derive(Parser)]
#[command(name = "topicbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "In-process topic/group event broker demo", long_about = None)]
struct Cli {
    /// Путь к файлу настроек (TOML)
    #[arg(short, long, env = "TOPICBUS_CONFIG")]
    config: Option<PathBuf>,
    /// Дополнительные события в широковещательную группу
    #[arg(short, long, default_value = "0")]
    events: u32,
    /// Переопределяет уровень логирования из настроек
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    init_logging(&settings.logging).map_err(|e| anyhow::anyhow!("logging init failed: {e}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT"),
        built = env!("BUILD_TIME"),
        "topicbus starting"
    );

    let broker = Broker::new(&settings.broker);
    let dispatcher = broker.spawn()?;

    let first = broker.register();
    let second = broker.register();
    first.subscribe(TopicAddr::new(DEMO_TOPIC, 1), printer("subscriber-1"))?;
    second.subscribe(TopicAddr::new(DEMO_TOPIC, 5), printer("subscriber-5"))?;

    let data = [1u8, 2, 3, 4, 5];
    broker.publish(TopicAddr::new(DEMO_TOPIC, 1), &data)?;
    broker.publish(TopicAddr::new(DEMO_TOPIC, 5), &data[..3])?;
    broker.publish(TopicAddr::wildcard(DEMO_TOPIC), &data[..1])?;

    for n in 0..cli.events {
        broker.publish_word(TopicAddr::wildcard(DEMO_TOPIC), n)?;
    }

    let dispatched = dispatcher.shutdown().await;
    drop(first);
    drop(second);

    let stats = broker.stats();
    info!(
        dispatched,
        stats = %serde_json::to_string(&stats)?,
        "topicbus finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn printer(name: &'static str) -> HandlerRef {
    Arc::new(move |topic: TopicAddr, payload: &[u8]| {
        info!(
            subscriber = name,
            topic_id = topic.topic_id(),
            group_id = topic.group_id(),
            ?payload,
            "Event received"
        );
    })
}
