mod cli;
mod k8s;
mod launch;
mod model;
mod orchestrator;
mod routing;
mod surface;
mod wizard;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use k8s::KubeGateway;
use launch::LaunchStore;
use model::{ConnectDescriptor, ExplicitTarget, ResourceKind};
use orchestrator::{Orchestrator, TunnelHandle};
use surface::TerminalSurface;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter)?;

    let kind = ResourceKind::from_token(&args.kind)
        .with_context(|| format!("unknown target kind '{}' (expected pod or service)", args.kind))?;
    let target = args.name.clone().map(|name| ExplicitTarget {
        name,
        namespace: args.namespace.clone(),
    });

    let gateway = KubeGateway::new().await?;
    let mut orchestrator = Orchestrator::new(
        gateway,
        TerminalSurface::new(),
        LaunchStore::discover(),
        TunnelHandle::probe(),
        orchestrator::check_prerequisites(),
    );

    if let Some(descriptor) = orchestrator.run(&args.reason, target, kind).await {
        print_descriptor(&descriptor, &args.output)?;
    }

    Ok(())
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

fn print_descriptor(descriptor: &ConnectDescriptor, format: &str) -> Result<()> {
    let rendered = match format.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => {
            serde_yaml::to_string(descriptor).context("failed to render descriptor as yaml")?
        }
        "json" => {
            serde_json::to_string_pretty(descriptor).context("failed to render descriptor as json")?
        }
        other => anyhow::bail!("unknown output format '{other}' (expected yaml or json)"),
    };
    print!("{rendered}");
    if !rendered.ends_with('\n') {
        println!();
    }

    Ok(())
}
