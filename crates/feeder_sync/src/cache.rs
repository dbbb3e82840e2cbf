//! Última leitura válida ("last-known-good").

use feeder_core::snapshot;
use feeder_core::types::TelemetrySample;
use std::path::Path;
use tracing::{info, warn};

/// Guarda a leitura exibida. Sem validação: quem chama já decidiu.
#[derive(Debug, Default)]
pub struct ValueCache {
    current: Option<TelemetrySample>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache semeado a partir do snapshot em disco.
    ///
    /// Snapshot ausente ou corrompido resulta em cache vazio.
    pub fn restore(path: &Path) -> Self {
        match snapshot::load_snapshot(path) {
            Ok(Some(sample)) => {
                info!(
                    "Última leitura restaurada de {} ({})",
                    path.display(),
                    sample.captured_at
                );
                Self {
                    current: Some(sample),
                }
            }
            Ok(None) => Self::new(),
            Err(e) => {
                warn!("Snapshot ignorado ({}): {e}", path.display());
                Self::new()
            }
        }
    }

    pub fn get(&self) -> Option<&TelemetrySample> {
        self.current.as_ref()
    }

    pub fn set(&mut self, sample: TelemetrySample) {
        self.current = Some(sample);
    }

    /// Persiste a leitura atual, se houver.
    pub fn persist(&self, path: &Path) {
        if let Some(sample) = &self.current {
            if let Err(e) = snapshot::save_snapshot(path, sample) {
                warn!("Falha ao salvar snapshot em {}: {e}", path.display());
            }
        }
    }
}
