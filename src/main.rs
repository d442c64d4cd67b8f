//! Demo binary: wires a [`Host`] to stdin so the crate is exercisable
//! without an external job runner. Each stdin line is enqueued as-is;
//! EOF signals `finish()`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use log_plugin_host::config::HostConfig;
use log_plugin_host::{Host, HostTuning, Plugin, PluginContext, PluginTrace, Step};

/// Run the log plugin host against stdin.
#[derive(Parser, Debug)]
#[command(name = "log-plugin-host")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Override the short-circuit queue-depth threshold.
    #[arg(long)]
    threshold: Option<usize>,

    /// Override the pressure-monitor sampling period, in milliseconds.
    #[arg(long)]
    period_ms: Option<u64>,
}

/// Demonstration plugin: echoes every processed line to the user output
/// channel, prefixed with the step name when one is known.
#[derive(Default)]
struct ConsolePlugin;

#[async_trait]
impl Plugin<()> for ConsolePlugin {
    fn friendly_name(&self) -> &str {
        "console"
    }

    async fn initialize(&mut self, _ctx: &PluginContext<()>) -> bool {
        true
    }

    async fn process_line(
        &mut self,
        ctx: &PluginContext<()>,
        step: Option<&Step>,
        message: &str,
    ) -> anyhow::Result<()> {
        match step {
            Some(step) => ctx.output(&format!("[{}] {message}", step.name)),
            None => ctx.output(message),
        }
        Ok(())
    }

    async fn finalize(&mut self, ctx: &PluginContext<()>) {
        ctx.output("done");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = HostConfig::from_env();
    if let Some(threshold) = cli.threshold {
        config = config.short_circuit_threshold(threshold);
    }
    if let Some(period_ms) = cli.period_ms {
        config = config.monitor_period(Duration::from_millis(period_ms));
    }

    let tuning: HostTuning = config.into_tuning();
    let steps = Arc::new(HashMap::new());
    let plugins: Vec<Box<dyn Plugin<()>>> = vec![Box::new(ConsolePlugin)];

    let host = Arc::new(Host::new(
        Arc::new(()),
        steps,
        Arc::new(HashMap::new()),
        Arc::new(HashMap::new()),
        Arc::new(HashMap::new()),
        plugins,
        PluginTrace::stdout(),
        tuning,
    ));

    let reader_host = Arc::clone(&host);
    let reader = tokio::spawn(async move {
        let stdin = BufReader::new(io::stdin());
        let mut lines = stdin.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            reader_host.enqueue(line);
        }
        reader_host.finish();
    });

    host.run().await?;
    reader.await?;

    Ok(())
}
