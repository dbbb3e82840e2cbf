//! # Feeder Sync
//!
//! Cliente de sincronização da telemetria ao vivo do alimentador.
//!
//! Mantém uma leitura "atual" estável e consistente a partir de duas
//! fontes que falham de forma independente: o canal push (socket.io) e o
//! canal pull (polling REST). Falhas congelam o valor exibido, nunca o
//! apagam.
//!
//! ## Módulos
//! - [`cache`] – Última leitura válida
//! - [`significance`] – Aplica na hora, coalesce ou descarta
//! - [`failure`] – Contador de falhas com histerese
//! - [`transport`] – Máquina de estados push/pull e fan-in de eventos
//! - [`client`] – Raiz de composição observável ([`SyncClient`])
//! - [`http`] / [`socket`] – Transportes reais (reqwest / tungstenite)
//! - [`clock`] – Relógio injetável para timers determinísticos

pub mod cache;
pub mod client;
pub mod clock;
pub mod error;
pub mod failure;
pub mod http;
pub mod significance;
pub mod socket;
pub mod transport;

// Re-exports convenientes
pub use client::SyncClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SyncError;
pub use transport::{PullChannel, PushChannel, TransportEvent, TransportMode};
