//! Example host process wiring the runtime core together: load
//! configuration, bring up the block pool / multiplexer / profiler for this
//! host, connect to the rest of the job, and run until interrupted.
//!
//! This binary is deliberately a thin wiring example (SPEC_FULL §1, §2):
//! it doesn't implement the collection-operator surface or user DAG
//! construction, only the process-level plumbing those would sit on top of.

#[macro_use]
extern crate tracing;

mod cli;
mod config;
mod context;
mod logging;
mod stats_sampler;

use clap::Parser;

use context::Context;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    logging::init();

    let cli = cli::Cli::parse();
    let config = match config::EngineConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "invalid configuration");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Some(metrics_addr) = config.metrics_addr {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            Ok(()) => info!(%metrics_addr, "prometheus exporter listening"),
            Err(error) => error!(%error, "failed to install prometheus exporter"),
        }
    }

    let host_rank = config.host_rank;
    let context = match Context::bootstrap(config).await {
        Ok(context) => context,
        Err(error) => {
            error!(%error, "failed to bring up host process");
            return std::process::ExitCode::FAILURE;
        }
    };

    context.profiler.record_cmdline(
        "start",
        std::env::args().next().unwrap_or_default(),
        std::env::args().skip(1).collect(),
    );

    if let Some(sampler) = dataflow_profiler::spawn_mem_profile_sampler(context.profiler.clone(), context.pool.clone()) {
        info!(interval = ?dataflow_profiler::SAMPLE_INTERVAL, "periodic memory profile sampler running");
        drop(sampler);
    }
    if let Some(sampler) = stats_sampler::spawn_host_stats_sampler(context.profiler.clone(), context.multiplexer.clone()) {
        info!("periodic net/proc stats sampler running");
        drop(sampler);
    }

    info!(host_rank, "host process running, waiting for Ctrl-C");
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to install Ctrl-C handler");
    }

    info!("shutting down");
    context.profiler.record_cmdline("stop", "dataflow-engine", vec![]);
    context.shutdown().await;

    std::process::ExitCode::SUCCESS
}
