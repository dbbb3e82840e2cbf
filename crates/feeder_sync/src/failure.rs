//! Contador de falhas consecutivas com histerese.
//!
//! Um timeout isolado não derruba o indicador de conexão: só a
//! `threshold`-ésima falha seguida marca offline.

use tracing::{info, warn};

/// Número padrão de falhas seguidas até marcar offline.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct FailureTracker {
    failures: u32,
    threshold: u32,
    connected: bool,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl FailureTracker {
    /// Começa conectado (otimista) até a primeira verificação.
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold: threshold.max(1),
            connected: true,
        }
    }

    /// Sucesso de qualquer canal: zera o contador e marca conectado.
    pub fn on_success(&mut self) {
        if !self.connected {
            info!("Backend voltou a responder após {} falha(s)", self.failures);
        }
        self.failures = 0;
        self.connected = true;
    }

    /// Registra uma falha e retorna o veredito de conexão atualizado.
    pub fn on_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.connected && self.failures >= self.threshold {
            warn!("{} falhas consecutivas, marcando offline", self.failures);
            self.connected = false;
        }
        self.connected
    }

    /// `disconnect` do socket: offline imediato, sem passar pelo contador.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_failures_do_not_flip() {
        let mut tracker = FailureTracker::default();
        assert!(tracker.on_failure());
        assert!(tracker.on_failure());
        assert!(tracker.is_connected());
        assert_eq!(tracker.failures(), 2);
    }

    #[test]
    fn third_failure_flips_offline() {
        let mut tracker = FailureTracker::default();
        tracker.on_failure();
        tracker.on_failure();
        assert!(!tracker.on_failure());
        assert!(!tracker.on_failure());
        assert!(!tracker.is_connected());
    }

    #[test]
    fn success_resets_counter() {
        let mut tracker = FailureTracker::default();
        for _ in 0..5 {
            tracker.on_failure();
        }
        tracker.on_success();
        assert!(tracker.is_connected());
        assert_eq!(tracker.failures(), 0);

        // Contagem recomeça do zero
        assert!(tracker.on_failure());
        assert!(tracker.on_failure());
        assert!(!tracker.on_failure());
    }

    #[test]
    fn disconnect_is_immediate() {
        let mut tracker = FailureTracker::default();
        tracker.mark_disconnected();
        assert!(!tracker.is_connected());
        assert_eq!(tracker.failures(), 0);
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        let mut tracker = FailureTracker::new(0);
        assert!(!tracker.on_failure());
    }
}
