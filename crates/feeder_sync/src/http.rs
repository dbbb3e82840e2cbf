//! Canal pull: `GET /dashboard` via reqwest (cliente bloqueante).
//!
//! Cada busca roda numa thread curta `rest-pull` e devolve o resultado
//! pelo channel de eventos. O timeout do cliente HTTP aborta buscas
//! lentas; uma resposta atrasada nunca trava o loop.

use crate::error::SyncError;
use crate::transport::{EventSender, PullChannel, TransportEvent};
use chrono::Utc;
use feeder_core::config::ClientConfig;
use feeder_core::protocol;
use feeder_core::types::TelemetrySample;
use reqwest::blocking::Client;
use std::thread;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct HttpPull {
    client: Client,
    dashboard_url: String,
    health_url: String,
}

impl HttpPull {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = Client::builder().timeout(config.fetch_timeout()).build()?;
        Ok(Self {
            client,
            dashboard_url: config.dashboard_url(),
            health_url: config.health_url(),
        })
    }

    /// Busca e valida a leitura agregada.
    pub fn fetch_dashboard(&self) -> Result<TelemetrySample, SyncError> {
        let response = self
            .client
            .get(&self.dashboard_url)
            .send()?
            .error_for_status()?;
        let received_at = Utc::now();
        let body = response.text()?;
        Ok(protocol::parse_reading_str(&body, received_at)?)
    }

    /// `GET /health` responde 2xx?
    pub fn check_health(&self) -> bool {
        match self.client.get(&self.health_url).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check falhou: {e}");
                false
            }
        }
    }
}

impl PullChannel for HttpPull {
    fn start_fetch(&mut self, events: &EventSender) {
        let this = self.clone();
        let tx = events.clone();

        let spawned = thread::Builder::new()
            .name("rest-pull".into())
            .spawn(move || {
                let result = this.fetch_dashboard();
                // Receptor largado: cliente já encerrou
                let _ = tx.send(TransportEvent::Pull(result));
            });

        if let Err(e) = spawned {
            warn!("Falha ao criar thread rest-pull: {e}");
            let _ = events.send(TransportEvent::Pull(Err(SyncError::Transport(e.to_string()))));
        }
    }
}
