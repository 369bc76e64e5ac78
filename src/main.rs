//! botforge dev runner.
//!
//! Wires the in-memory queues and directory to the real scheduler and an
//! OpenAI-compatible generation backend, enqueues one original-post task for
//! a demo avatar, and waits for the pipeline to drive it to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use botforge::config::PipelineConfig;
use botforge::llm::{GenerationClient, HttpGenerationClient};
use botforge::pipeline::{BotTaskPoller, GenerationPoller, PublishPoller};
use botforge::repo::{
    BotTaskRepo, MemoryBotTaskRepo, MemoryGenerationTaskRepo, MemoryPublishTaskRepo,
};
use botforge::scheduler::Scheduler;
use botforge::social::MemoryDirectory;
use botforge::trigger::TriggerService;

#[derive(Parser, Debug)]
#[command(name = "botforge", about = "Run one avatar post through the pipeline")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Avatar id to post as
    #[arg(long, default_value = "demo-bot")]
    avatar: String,

    /// Persona prompt for the avatar
    #[arg(
        long,
        default_value = "You are a cheerful robot who posts about small daily joys."
    )]
    persona: String,

    /// Maximum seconds to wait for the task to reach a terminal state
    #[arg(long, default_value_t = 120)]
    max_wait: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with environment filter
    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    let config = PipelineConfig::from_env().context("failed to load pipeline configuration")?;
    config.validate().context("invalid pipeline configuration")?;

    let client: Arc<dyn GenerationClient> = Arc::new(
        HttpGenerationClient::from_env().context("failed to configure generation backend")?,
    );

    let bot_tasks = Arc::new(MemoryBotTaskRepo::new());
    let generation_tasks = Arc::new(MemoryGenerationTaskRepo::new());
    let publish_tasks = Arc::new(MemoryPublishTaskRepo::new());
    let directory = Arc::new(MemoryDirectory::new());

    directory.set_persona(&cli.avatar, &cli.persona).await;

    let mut scheduler = Scheduler::new();
    scheduler.add_stage(
        Arc::new(BotTaskPoller::new(
            bot_tasks.clone(),
            generation_tasks.clone(),
            directory.clone(),
            directory.clone(),
        )),
        config.bot_stage,
    );
    scheduler.add_stage(
        Arc::new(GenerationPoller::new(
            generation_tasks.clone(),
            publish_tasks.clone(),
            bot_tasks.clone(),
            client,
            config.generation_timeout,
            config.publish_delay,
            config.generation_batch_cap,
        )),
        config.generation_stage,
    );
    scheduler.add_stage(
        Arc::new(PublishPoller::new(
            publish_tasks.clone(),
            bot_tasks.clone(),
            directory.clone(),
        )),
        config.publish_stage,
    );

    let trigger = TriggerService::new(bot_tasks.clone(), directory.clone());
    let task_id = trigger.original_post_due(&cli.avatar).await?;

    scheduler.start()?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.max_wait);
    loop {
        if tokio::time::Instant::now() >= deadline {
            error!(task_id = %task_id, "Task did not reach a terminal state in time");
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let task = bot_tasks
            .get(task_id)
            .await?
            .context("enqueued task disappeared")?;
        if task.stage.is_terminal() {
            match task.result_post_id {
                Some(post_id) => {
                    info!(task_id = %task_id, post_id = %post_id, "Task published");
                    if let Some((_, post)) = directory
                        .posts()
                        .await
                        .into_iter()
                        .find(|(id, _)| *id == post_id)
                    {
                        println!("{} posted: {}", cli.avatar, post.content);
                    }
                }
                None => {
                    error!(
                        task_id = %task_id,
                        error = task.error_message.as_deref().unwrap_or("unknown"),
                        "Task failed"
                    );
                }
            }
            break;
        }
        info!(task_id = %task_id, stage = %task.stage, "Waiting for pipeline");
    }

    scheduler.shutdown().await?;

    for (stage, stats) in scheduler.stats() {
        info!(
            stage = stage,
            polls = stats.polls,
            skipped = stats.skipped_polls,
            claimed = stats.tasks_claimed,
            advanced = stats.tasks_advanced,
            failed = stats.tasks_failed,
            "Stage totals"
        );
    }

    Ok(())
}
