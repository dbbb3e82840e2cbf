//! # Feeder Core
//!
//! Crate compartilhada que define as estruturas de dados, o protocolo de
//! entrada (JSON do backend e framing socket.io), a configuração TOML e o
//! snapshot binário do cliente de telemetria do alimentador CatBot.
//!
//! ## Módulos
//! - [`types`] – Leitura de sensores, estado observável, tipos de erro
//! - [`protocol`] – Validação de payloads JSON e pacotes Engine.IO/socket.io
//! - [`config`] – Configuração unificada via TOML
//! - [`alerts`] – Thresholds e níveis de alerta do tanque
//! - [`snapshot`] – Persistência binária (bincode) da última leitura válida

pub mod types;
pub mod protocol;
pub mod config;
pub mod alerts;
pub mod snapshot;

// Re-exports convenientes
pub use types::{ErrorKind, MotorState, SyncState, TelemetrySample, TimeSource};
pub use protocol::{parse_reading, ProtocolError};
pub use config::{AppConfig, ClientConfig, SocketConfig};
