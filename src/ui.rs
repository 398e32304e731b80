//! Interface de terminal do optijob: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`TaskProgress`] acompanha visualmente
//! as fases de uma tarefa no terminal.

use std::sync::Arc;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use optijob::orchestrator::PhaseObserver;
use optijob::remote::{JobOptionCatalog, JobStatusReport};
use optijob::state_machine::{Task, TaskStatus};

/// Indicador visual de progresso para a execução de uma tarefa no terminal.
///
/// Exibe um spinner animado enquanto a tarefa avança e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e parada (amarelo).
pub struct TaskProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl TaskProgress {
    /// Inicia o spinner com a descrição da tarefa.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("CREATED: {description}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Observador que atualiza o spinner a cada checkpoint.
    pub fn observer(&self) -> PhaseObserver {
        let pb = self.pb.clone();
        Arc::new(move |task: &Task| {
            let remote = task.remote_job_id.as_deref().unwrap_or("-");
            pb.set_message(format!("{} [{}] remote={remote}", task.phase, task.status));
        })
    }

    /// Finaliza o spinner e exibe o resultado final da tarefa.
    pub fn finish(&self, task: &Task) {
        self.pb.finish_and_clear();
        match task.status {
            TaskStatus::Completed => {
                println!("  {} Task {} completed", self.green.apply_to("✓"), task.task_id);
                if let Some(output) = &task.output_artifact {
                    println!("    output: {}", output.location);
                }
            }
            TaskStatus::Stopped | TaskStatus::Timeout => {
                println!("  {} Task {} {}", self.yellow.apply_to("■"), task.task_id, task.status);
            }
            _ => {
                let reason = task
                    .error_detail
                    .as_ref()
                    .map(|d| format!("{}: {}", d.kind, d.message))
                    .unwrap_or_default();
                println!("  {} Task {} failed: {reason}", self.red.apply_to("✗"), task.task_id);
            }
        }
    }

    /// Encerra o spinner sem resultado (modo --no-wait).
    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }
}

/// Imprime o registro da tarefa em JSON com um título colorido pelo status.
pub fn print_task(task: &Task) {
    let style = match task.status {
        TaskStatus::Completed => Style::new().green(),
        TaskStatus::Error => Style::new().red(),
        _ => Style::new().yellow(),
    };
    println!("{}", style.apply_to(format!("─── Task {} ({}) ───", task.task_id, task.status)));
    println!("{}", serde_json::to_string_pretty(task).unwrap_or_default());
}

pub fn print_cancel(task_id: &str, report: &JobStatusReport) {
    println!(
        "  {} Cancel requested for {task_id}: remote status {}",
        Style::new().yellow().apply_to("↻"),
        report.status
    );
}

/// Lista o catálogo de opções agrupado por framework.
pub fn print_catalog(catalog: &JobOptionCatalog) {
    let bold = Style::new().bold();
    if catalog.options.is_empty() {
        println!("  no supported combinations");
        return;
    }
    for option in &catalog.options {
        println!("{}", bold.apply_to(&option.framework));
        for device in &option.devices {
            let versions: Vec<&str> = device
                .software_versions
                .iter()
                .filter_map(|v| v.software_version.as_deref())
                .collect();
            println!(
                "  {} versions={:?} data_types={:?} hardware={:?}",
                device.device_name, versions, device.data_types, device.hardware_types
            );
        }
    }
}
