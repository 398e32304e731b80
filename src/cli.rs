//! Interface de linha de comando do optijob baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (convert, benchmark,
//! quantize, status, cancel, options) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use optijob::family::JobFamily;
use optijob::params::{BenchmarkParams, ConvertParams, JobParams, QuantizeParams};

/// optijob: orquestrador de jobs remotos de otimização de modelos.
#[derive(Debug, Parser)]
#[command(name = "optijob", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./optijob.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Família de job aceita pela CLI, mapeada para [`JobFamily`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    Convert,
    Benchmark,
    Quantize,
}

impl From<FamilyArg> for JobFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Convert => JobFamily::Convert,
            FamilyArg::Benchmark => JobFamily::Benchmark,
            FamilyArg::Quantize => JobFamily::Quantize,
        }
    }
}

/// Controle da espera pelo estado terminal.
#[derive(Debug, Clone, Args)]
pub struct WaitArgs {
    /// Retorna logo após iniciar o job remoto.
    #[arg(long, default_value_t = false)]
    pub no_wait: bool,

    /// Intervalo entre leituras de status, em segundos.
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Prazo máximo de espera, em segundos.
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Converte um modelo para outro framework.
    Convert {
        /// Arquivo do modelo (.onnx, .h5, .keras, .pb, .zip).
        model: PathBuf,

        /// Framework de destino.
        #[arg(long)]
        framework: String,

        /// Dispositivo de destino.
        #[arg(long)]
        device: String,

        #[arg(long, default_value = "FP16")]
        data_type: String,

        /// Versão de software (obrigatória para Jetson e TensorRT).
        #[arg(long)]
        software_version: Option<String>,

        /// Dataset de calibração.
        #[arg(long)]
        dataset_path: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Mede a latência de um modelo em um dispositivo.
    Benchmark {
        model: PathBuf,

        #[arg(long)]
        device: String,

        #[arg(long)]
        software_version: Option<String>,

        #[arg(long)]
        hardware_type: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Quantiza um modelo.
    Quantize {
        model: PathBuf,

        #[arg(long, default_value = "plain_quantization")]
        mode: String,

        #[arg(long, default_value = "SNR")]
        metric: String,

        #[arg(long, default_value_t = 0.0)]
        threshold: f64,

        #[arg(long, default_value = "int8")]
        weight_precision: String,

        #[arg(long, default_value = "int8")]
        activation_precision: String,

        #[arg(long)]
        dataset_path: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Mostra o registro de uma tarefa.
    Status {
        task_id: String,

        /// Consulta o serviço remoto e reconcilia o registro.
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },

    /// Pede ao serviço que cancele o job remoto de uma tarefa.
    Cancel { task_id: String },

    /// Lista as combinações suportadas por uma família.
    Options {
        family: FamilyArg,

        /// Framework do modelo de origem.
        framework: String,

        #[arg(long)]
        device: Option<String>,

        #[arg(long)]
        software_version: Option<String>,
    },
}

impl Command {
    /// Caminho do modelo, parâmetros e opções de espera dos subcomandos de submissão.
    pub fn submission(&self) -> Option<(PathBuf, JobParams, WaitArgs)> {
        match self {
            Command::Convert {
                model,
                framework,
                device,
                data_type,
                software_version,
                dataset_path,
                wait,
            } => Some((
                model.clone(),
                JobParams::Convert(ConvertParams {
                    framework: framework.clone(),
                    device_name: device.clone(),
                    data_type: data_type.clone(),
                    software_version: software_version.clone(),
                    input_layer: None,
                    dataset_path: dataset_path.clone(),
                }),
                wait.clone(),
            )),
            Command::Benchmark {
                model,
                device,
                software_version,
                hardware_type,
                wait,
            } => Some((
                model.clone(),
                JobParams::Benchmark(BenchmarkParams {
                    device_name: device.clone(),
                    software_version: software_version.clone(),
                    hardware_type: hardware_type.clone(),
                }),
                wait.clone(),
            )),
            Command::Quantize {
                model,
                mode,
                metric,
                threshold,
                weight_precision,
                activation_precision,
                dataset_path,
                wait,
            } => Some((
                model.clone(),
                JobParams::Quantize(QuantizeParams {
                    quantization_mode: mode.clone(),
                    metric: metric.clone(),
                    threshold: *threshold,
                    weight_precision: weight_precision.clone(),
                    activation_precision: activation_precision.clone(),
                    input_layers: None,
                    dataset_path: dataset_path.clone(),
                }),
                wait.clone(),
            )),
            _ => None,
        }
    }
}
