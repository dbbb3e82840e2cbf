//! Configuração unificada via TOML.
//!
//! Substitui o `config.ts` do frontend por um único `config.toml`, com
//! override por variáveis de ambiente para o endereço do backend.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Variáveis de ambiente aceitas por [`AppConfig::apply_env_with`].
pub const ENV_API_BASE_URL: &str = "FEEDER_API_BASE_URL";
pub const ENV_WS_ENABLED: &str = "FEEDER_WS_ENABLED";
pub const ENV_REFRESH_INTERVAL_MS: &str = "FEEDER_REFRESH_INTERVAL_MS";

/// Configuração do cliente de sincronização.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL base do backend (REST e socket.io)
    pub api_base_url: String,
    /// `true` = WebSocket primário com fallback REST; `false` = só polling
    pub ws_enabled: bool,
    /// Intervalo de polling REST (ms)
    pub refresh_interval_ms: u64,
    /// Timeout rígido de cada requisição REST (ms)
    pub fetch_timeout_ms: u64,
    /// Falhas consecutivas até marcar offline
    pub failure_threshold: u32,
    /// Atraso de coalescência para variações pequenas (ms)
    pub debounce_ms: u64,
    /// Variação mínima de peso aplicada na hora (g)
    pub weight_threshold: f64,
    /// Variação mínima do nível do tanque aplicada na hora (%)
    pub distance_threshold: f64,
    /// Arquivo da última leitura válida (vazio = desativado)
    pub snapshot_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".into(),
            ws_enabled: false,
            refresh_interval_ms: 10_000,
            fetch_timeout_ms: 10_000,
            failure_threshold: 3,
            debounce_ms: 100,
            weight_threshold: 1.0,
            distance_threshold: 1.0,
            snapshot_path: String::new(),
        }
    }
}

impl ClientConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        if self.snapshot_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.snapshot_path))
        }
    }

    /// URL do endpoint de leitura agregada.
    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.api_base_url.trim_end_matches('/'))
    }

    /// URL do health check rápido do backend.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.api_base_url.trim_end_matches('/'))
    }
}

/// Configuração do canal socket.io.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Caminho do endpoint socket.io no backend
    pub path: String,
    /// Espera inicial antes de reconectar (ms)
    pub reconnection_delay_ms: u64,
    /// Espera máxima entre tentativas (ms)
    pub reconnection_delay_max_ms: u64,
    /// Tempo máximo para o handshake Engine.IO + namespace (ms)
    pub handshake_timeout_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            path: "/socket.io/".into(),
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            handshake_timeout_ms: 10_000,
        }
    }
}

impl SocketConfig {
    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }

    pub fn reconnection_delay_max(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_max_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Thresholds de alerta do tanque.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Abaixo disto o nível do tanque gera aviso (%)
    pub tank_warning_percent: f64,
    /// Abaixo disto o nível do tanque é crítico (%)
    pub tank_critical_percent: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            tank_warning_percent: 30.0,
            tank_critical_percent: 20.0,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub socket: SocketConfig,
    pub alerts: AlertThresholds,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Aplica overrides do ambiente do processo.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Aplica overrides vindos de `lookup`; valores inválidos são ignorados.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|v| !v.trim().is_empty()) {
            info!("{ENV_API_BASE_URL} = {url}");
            self.client.api_base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_WS_ENABLED) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.client.ws_enabled = true,
                "0" | "false" | "no" | "off" => self.client.ws_enabled = false,
                other => warn!("{ENV_WS_ENABLED} inválido: {other}"),
            }
        }

        if let Some(raw) = lookup(ENV_REFRESH_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.client.refresh_interval_ms = ms,
                Err(e) => warn!("{ENV_REFRESH_INTERVAL_MS} inválido ({raw}): {e}"),
            }
        }
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let client = &self.client;

        if !(client.api_base_url.starts_with("http://") || client.api_base_url.starts_with("https://")) {
            errors.push(format!(
                "api_base_url deve começar com http:// ou https://: {}",
                client.api_base_url
            ));
        }
        if client.refresh_interval_ms < 100 || client.refresh_interval_ms > 3_600_000 {
            errors.push(format!(
                "Intervalo de polling inválido: {}ms (100–3600000)",
                client.refresh_interval_ms
            ));
        }
        if client.fetch_timeout_ms == 0 {
            errors.push("Timeout REST não pode ser 0".into());
        }
        if client.failure_threshold == 0 {
            errors.push("failure_threshold deve ser pelo menos 1".into());
        }
        if client.weight_threshold < 0.0 || client.distance_threshold < 0.0 {
            errors.push("Thresholds de significância não podem ser negativos".into());
        }
        if self.socket.reconnection_delay_ms > self.socket.reconnection_delay_max_ms {
            errors.push(format!(
                "reconnection_delay_ms ({}) maior que reconnection_delay_max_ms ({})",
                self.socket.reconnection_delay_ms, self.socket.reconnection_delay_max_ms
            ));
        }
        if self.alerts.tank_critical_percent > self.alerts.tank_warning_percent {
            errors.push("tank_critical_percent deve ser menor que tank_warning_percent".into());
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.client.api_base_url, parsed.client.api_base_url);
        assert_eq!(config.socket.path, parsed.socket.path);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[client]
ws_enabled = true
refresh_interval_ms = 3000
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert!(config.client.ws_enabled);
        assert_eq!(config.client.refresh_interval_ms, 3000);
        // Outros campos devem ter valor padrão
        assert_eq!(config.client.failure_threshold, 3);
        assert_eq!(config.client.debounce_ms, 100);
        assert_eq!(config.socket.reconnection_delay_max_ms, 5000);
    }

    #[test]
    fn env_overrides_are_applied() {
        let env: HashMap<&str, &str> = [
            (ENV_API_BASE_URL, "http://catbot.local:5000"),
            (ENV_WS_ENABLED, "true"),
            (ENV_REFRESH_INTERVAL_MS, "3000"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.client.api_base_url, "http://catbot.local:5000");
        assert!(config.client.ws_enabled);
        assert_eq!(config.client.refresh_interval(), Duration::from_secs(3));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_with(|key| match key {
            ENV_WS_ENABLED => Some("talvez".into()),
            ENV_REFRESH_INTERVAL_MS => Some("rápido".into()),
            _ => None,
        });
        assert!(!config.client.ws_enabled);
        assert_eq!(config.client.refresh_interval_ms, 10_000);
    }

    #[test]
    fn urls_are_joined_without_double_slash() {
        let client = ClientConfig {
            api_base_url: "http://catbot.local:5000/".into(),
            ..Default::default()
        };
        assert_eq!(client.dashboard_url(), "http://catbot.local:5000/dashboard");
        assert_eq!(client.health_url(), "http://catbot.local:5000/health");
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = AppConfig::default();
        config.client.api_base_url = "catbot.local".into();
        config.client.failure_threshold = 0;
        config.socket.reconnection_delay_ms = 10_000;
        assert_eq!(config.validate().len(), 3);
    }

    #[test]
    fn empty_snapshot_path_disables_persistence() {
        assert!(ClientConfig::default().snapshot_path().is_none());
    }
}
