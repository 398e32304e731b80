mod cli;
mod ui;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use cli::{Cli, Command};
use optijob::app::App;
use optijob::config::OptijobConfig;
use optijob::orchestrator::{SubmitRequest, WaitOptions};
use optijob::state_machine::TaskStatus;
use ui::TaskProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "optijob=debug" } else { "optijob=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = OptijobConfig::load(cli.config.as_deref())?;
    let app = App::new(config).context("building HTTP client")?;

    if let Some((model, params, wait)) = cli.command.submission() {
        let family = params.family();
        let request = SubmitRequest {
            account_id: app.config().account_id.clone(),
            input_model_path: model.clone(),
            params,
        };
        let progress = TaskProgress::start(&format!("{family} {}", model.display()));
        let orchestrator = app.orchestrator(family, Some(progress.observer()));

        if wait.no_wait {
            let task_id = orchestrator.submit(request).await;
            progress.abandon();
            let task_id = task_id?;
            println!("{task_id}");
            return Ok(());
        }

        let interrupt = CancellationToken::new();
        let on_ctrl_c = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping wait");
                on_ctrl_c.cancel();
            }
        });

        let options = WaitOptions {
            poll_interval: wait
                .poll_interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| app.config().poll_interval()),
            timeout: wait.timeout.map(Duration::from_secs).or_else(|| app.config().timeout()),
            interrupt,
        };
        let task = orchestrator.submit_and_wait(request, options).await;
        let task = match task {
            Ok(task) => task,
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        };
        progress.finish(&task);
        if task.status != TaskStatus::Completed {
            std::process::exit(1);
        }
        return Ok(());
    }

    match cli.command {
        Command::Status { task_id, refresh } => {
            let Some(task) = app.find_task(&task_id).await? else {
                bail!("task {task_id} not found");
            };
            let task = if refresh {
                app.orchestrator(task.family, None).refresh(&task_id).await?
            } else {
                task
            };
            ui::print_task(&task);
        }
        Command::Cancel { task_id } => {
            let Some(task) = app.find_task(&task_id).await? else {
                bail!("task {task_id} not found");
            };
            let report = app.orchestrator(task.family, None).cancel(&task_id).await?;
            ui::print_cancel(&task_id, &report);
        }
        Command::Options {
            family,
            framework,
            device,
            software_version,
        } => {
            let catalog = app.orchestrator(family.into(), None).options(&framework).await?;
            let catalog = match device.as_deref() {
                Some(device) => catalog.for_device(device, software_version.as_deref()),
                None => catalog,
            };
            ui::print_catalog(&catalog);
        }
        Command::Convert { .. } | Command::Benchmark { .. } | Command::Quantize { .. } => {}
    }

    Ok(())
}
