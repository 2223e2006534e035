//! Configuração do job manager carregada a partir de `jobmanager.toml`.
//!
//! A struct [`JobManagerConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `MATCHMAKING_URL`, `POLICYMANAGER_URL`,
//! `SERVER_PORT` e `RUST_LOG` têm precedência sobre o arquivo.

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::dispatch::DEFAULT_STALENESS_WINDOW_SECS;

/// Caminho padrão do arquivo de configuração.
pub const DEFAULT_CONFIG_PATH: &str = "jobmanager.toml";

/// Configuração de nível superior carregada de `jobmanager.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobManagerConfig {
    /// Endereço em que o servidor HTTP escuta.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// URL base do serviço de matchmaking.
    #[serde(default)]
    pub matchmaker_url: String,

    /// URL base do policy manager. Vazio desativa a notificação.
    #[serde(default)]
    pub policy_manager_url: String,

    /// Segundos sem atualização após os quais um lease pode ser retomado por outro dono.
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,

    /// Timeout das chamadas aos serviços externos, em segundos.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Filtro de log no formato do `EnvFilter`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

// Valor padrão para o endereço: "0.0.0.0:8082".
fn default_listen_addr() -> String {
    "0.0.0.0:8082".to_string()
}

// Valor padrão para a janela de inatividade: 300s.
fn default_staleness_window_secs() -> u64 {
    DEFAULT_STALENESS_WINDOW_SECS as u64
}

fn checked_window(secs: u64) -> Option<TimeDelta> {
    i64::try_from(secs).ok().and_then(TimeDelta::try_seconds)
}

// Valor padrão para o timeout HTTP: 30s.
fn default_http_timeout_secs() -> u64 {
    30
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            matchmaker_url: String::new(),
            policy_manager_url: String::new(),
            staleness_window_secs: default_staleness_window_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            log_filter: default_log_filter(),
        }
    }
}

impl JobManagerConfig {
    /// Carrega a configuração de `jobmanager.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Carrega a configuração de um caminho explícito e aplica o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<JobManagerConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Rejeita valores que não podem ser usados em tempo de execução.
    pub fn validate(&self) -> Result<()> {
        if self.staleness_window_secs == 0 {
            bail!("staleness_window_secs must be greater than zero");
        }
        if checked_window(self.staleness_window_secs).is_none() {
            bail!(
                "staleness_window_secs {} is out of range",
                self.staleness_window_secs
            );
        }
        Ok(())
    }

    // Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("MATCHMAKING_URL") {
            self.matchmaker_url = url;
        }
        if let Some(url) = non_empty("POLICYMANAGER_URL") {
            self.policy_manager_url = url;
        }
        if let Some(filter) = non_empty("RUST_LOG") {
            self.log_filter = filter;
        }
        if let Some(port) = non_empty("SERVER_PORT") {
            let host = self
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.listen_addr = format!("{host}:{port}");
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.listen_addr))
    }

    /// Janela de inatividade como duração. Valores fora do intervalo caem
    /// no padrão de 300s; `validate` os recusa no carregamento.
    pub fn staleness_window(&self) -> TimeDelta {
        checked_window(self.staleness_window_secs)
            .unwrap_or_else(|| TimeDelta::seconds(DEFAULT_STALENESS_WINDOW_SECS))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
