// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{bail, Context};
use avalanche::config::{assemble, build_options, load_and_validate_config, precedence_options};
use avalanche::engine::scheduler::AvalancheScheduler;
use avalanche::errors::ScheduleError;
use avalanche::precedence::PrecedenceService;
use avalanche::slot::EventContext;
use avalanche::traits::InMemoryWhiteboard;
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <config.yaml> [num_events]", args[0]);
        eprintln!("Example: {} configs/diamond.yaml 8", args[0]);
        std::process::exit(1);
    }

    let config_file = &args[1];
    let num_events: u64 = match args.get(2) {
        Some(n) => n.parse().context("num_events must be an integer")?,
        None => 4,
    };

    let config = load_and_validate_config(config_file)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("loading {}", config_file))?;

    let builder = assemble(&config)?;
    let graph = builder.build(&build_options(&config.scheduler)?)?;
    let service = PrecedenceService::with_options(graph, precedence_options(&config.scheduler));

    let whiteboard = Arc::new(InMemoryWhiteboard::new(config.scheduler.event_slots));
    let scheduler = AvalancheScheduler::new(service, &config.scheduler, whiteboard)?;

    if config.scheduler.dump_intra_event_dynamics {
        scheduler.record_occupancy(
            0,
            Box::new(|snapshot| {
                if let Ok(line) = serde_json::to_string(&snapshot) {
                    tracing::info!(target: "occupancy", "{}", line);
                }
            }),
        )?;
    }

    println!(
        "avalanche: processing {} event(s) over {} slot(s) from {}",
        num_events, config.scheduler.event_slots, config_file
    );

    let started = Instant::now();
    let mut pushed: u64 = 0;
    let mut finished: u64 = 0;
    let mut failed: u64 = 0;

    while finished < num_events {
        // keep pushing until the slots saturate, then drain one
        while pushed < num_events {
            match scheduler.push_new_event(EventContext::new(pushed)) {
                Ok(()) => pushed += 1,
                Err(ScheduleError::SlotUnavailable) => break,
                Err(error) => bail!("push failed: {}", error),
            }
        }

        let event = scheduler.pop_finished_event().await?;
        if event.failed {
            failed += 1;
            println!("  {} FAILED", event.context);
        } else {
            println!("  {} done", event.context);
        }
        finished += 1;
    }

    let elapsed = started.elapsed();
    scheduler.shutdown().await?;

    println!(
        "processed {} event(s) in {:.1?} ({} failed)",
        finished, elapsed, failed
    );
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
