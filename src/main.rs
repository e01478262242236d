// Copyright (c) 2024-2026 switchyard contributors
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use switchyard_bus::SubscribeOptions;
use switchyard_engine::{EngineRegistry, RegisterOptions};
use switchyard_pool::PoolManager;
use switchyard_queue::{SubmitOptions, TaskManager};
use switchyard_testing::MockEngine;
use switchyard_types::{Task, TaskInput, TaskKind, WILDCARD_TOPIC};

/// Demo registry wiring: registers the bundled mock/script engines from
/// `switchyard-testing` so this binary proves the core's wiring end to end
/// without depending on any real backend process. A real deployment would
/// call `registry.register`/`register_factory` with its own `Engine` impls
/// instead of this block.
fn register_demo_engines(registry: &EngineRegistry) {
    registry.register(
        Arc::new(MockEngine::new("mock")),
        RegisterOptions {
            auto_initialize: false,
            as_default: true,
        },
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = switchyard_config::load(cli.config.as_deref())
        .context("loading switchyard configuration")?;

    match cli.command.unwrap_or(Commands::ShowConfig) {
        Commands::ShowConfig => {
            let text = serde_yaml::to_string(&config).context("serializing config")?;
            print!("{text}");
            Ok(())
        }
        Commands::ListEngines => {
            let bus = Arc::new(config.bus.build());
            let registry = EngineRegistry::new(bus);
            register_demo_engines(&registry);
            for descriptor in registry.list() {
                println!(
                    "{}\t{}\t{}\tinitialized={}\tavailable={}",
                    descriptor.id,
                    descriptor.name,
                    descriptor.capabilities.version,
                    descriptor.initialized,
                    descriptor.available,
                );
            }
            Ok(())
        }
        Commands::Run {
            prompt,
            kind,
            engine,
            priority,
            json,
        } => run_task(config, prompt, kind, engine, priority.into(), json).await,
        Commands::Parse => parse_stdin(),
    }
}

fn parse_stdin() -> anyhow::Result<()> {
    use std::io::BufRead;

    let mut parser = switchyard_parser::StreamParser::new();
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        for event in parser.feed(&format!("{line}\n")) {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    for event in parser.flush() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

async fn run_task(
    config: switchyard_config::Config,
    prompt: String,
    kind: String,
    engine: Option<String>,
    priority: switchyard_types::Priority,
    json: bool,
) -> anyhow::Result<()> {
    let bus = Arc::new(config.bus.build());
    let registry = Arc::new(EngineRegistry::new(bus.clone()));
    register_demo_engines(&registry);

    let pools = Arc::new(PoolManager::new(config.pool.build()));
    let manager = TaskManager::new(bus.clone(), registry, pools, config.queue.build_manager());

    // Mirror every event onto stdout as it is published; `execute` below
    // only tells us the terminal outcome, not the stream in between.
    let json_events = json;
    let _printer = bus.subscribe(
        WILDCARD_TOPIC,
        Arc::new(move |event: &switchyard_types::Event| {
            if json_events {
                if let Ok(line) = serde_json::to_string(event) {
                    println!("{line}");
                }
            } else {
                println!("[{}] {:?}", event.topic(), event);
            }
        }),
        SubscribeOptions::default(),
    );

    let mut task = Task::new(
        uuid::Uuid::new_v4().to_string(),
        TaskKind::from(kind.as_str()),
        TaskInput::new(prompt),
    );
    if let Some(engine_id) = engine.or_else(|| config.default_engine.clone()) {
        task = task.with_engine(engine_id);
    }

    let options = SubmitOptions {
        priority,
        timeout_ms: None,
    };

    match manager.execute(task, options).await {
        Ok(_) => {
            info!("task completed");
            Ok(())
        }
        Err(err) => {
            anyhow::bail!("task did not complete: {err}")
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
