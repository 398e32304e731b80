//! Configuração do optijob carregada a partir de `optijob.toml`.
//!
//! A struct [`OptijobConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `OPTIJOB_*` têm precedência sobre o arquivo
//! para tokens e credenciais.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::orchestrator::OrchestratorSettings;
use crate::quota::PriceTable;

/// Nome do arquivo procurado no diretório atual.
pub const CONFIG_FILE: &str = "optijob.toml";

/// Configuração de nível superior carregada de `optijob.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct OptijobConfig {
    /// URL base do serviço de otimização (rotas `/{family}/...` e `/accounts`).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// URL base do serviço de autenticação (`/auth/...`).
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,

    /// Conta cujo saldo de créditos é verificado antes de cada job.
    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Credenciais usadas quando o refresh token não é aceito.
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Diretório dos registros de tarefas (um JSON por tarefa).
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Diretório onde os artefatos baixados são gravados.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Intervalo fixo entre leituras de status, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Prazo máximo de espera; sem prazo quando ausente.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Registra USER_CANCEL remoto como STOPPED em vez de ERROR.
    #[serde(default)]
    pub user_cancel_as_stopped: bool,

    #[serde(default)]
    pub prices: PriceTable,
}

// Valor padrão para a URL da API.
fn default_api_base_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

// Valor padrão para a URL de autenticação.
fn default_auth_base_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".optijob/tasks")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

// Valor padrão para o intervalo de polling: 30s.
fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for OptijobConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            auth_base_url: default_auth_base_url(),
            account_id: String::new(),
            access_token: String::new(),
            refresh_token: None,
            email: None,
            password: None,
            store_dir: default_store_dir(),
            output_dir: default_output_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: None,
            user_cancel_as_stopped: false,
            prices: PriceTable::default(),
        }
    }
}

impl OptijobConfig {
    /// Carrega a configuração de `path`, ou de `optijob.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(CONFIG_FILE));
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<OptijobConfig>(&contents).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Aplica as variáveis de ambiente não vazias por cima do arquivo.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(token) = get("OPTIJOB_ACCESS_TOKEN") {
            self.access_token = token;
        }
        if let Some(token) = get("OPTIJOB_REFRESH_TOKEN") {
            self.refresh_token = Some(token);
        }
        if let Some(email) = get("OPTIJOB_EMAIL") {
            self.email = Some(email);
        }
        if let Some(password) = get("OPTIJOB_PASSWORD") {
            self.password = Some(password);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Credenciais de login, quando ambas estão presentes.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.email, &self.password) {
            (Some(email), Some(password)) => Some((email.clone(), password.clone())),
            _ => None,
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            output_dir: self.output_dir.clone(),
            poll_interval: self.poll_interval(),
            user_cancel_as_stopped: self.user_cancel_as_stopped,
        }
    }
}
