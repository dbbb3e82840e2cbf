//! Definição de tipos/structs da telemetria do alimentador.
//!
//! Uma [`TelemetrySample`] é imutável: cada leitura nova substitui a
//! anterior por inteiro, nunca é alterada campo a campo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Motor
// ──────────────────────────────────────────────

/// Estado do motor de alimentação.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorState {
    #[default]
    Idle,
    Running,
}

impl MotorState {
    pub fn is_running(self) -> bool {
        self == MotorState::Running
    }
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotorState::Idle => f.write_str("parado"),
            MotorState::Running => f.write_str("girando"),
        }
    }
}

// ──────────────────────────────────────────────
// Leitura
// ──────────────────────────────────────────────

/// De qual relógio veio o `captured_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeSource {
    /// Instante absoluto informado pelo backend (epoch ou RFC 3339)
    #[default]
    Backend,
    /// Hora do recebimento no cliente (payload sem timestamp ou sem fuso)
    Received,
}

/// Snapshot das leituras do alimentador.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Peso no pote (g), `None` se a célula de carga não respondeu
    pub weight: Option<f64>,
    /// Nível do tanque medido pelo sensor ultrassônico (%)
    pub tank_distance: Option<f64>,
    pub motor_state: MotorState,
    /// Total consumido hoje (g)
    pub consumed_today: f64,
    /// Momento da captura (backend) ou do recebimento, conforme `time_source`
    pub captured_at: DateTime<Utc>,
    pub time_source: TimeSource,
}

impl TelemetrySample {
    pub fn new(
        weight: Option<f64>,
        tank_distance: Option<f64>,
        motor_state: MotorState,
        consumed_today: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            weight,
            tank_distance,
            motor_state,
            consumed_today,
            captured_at,
            time_source: TimeSource::Backend,
        }
    }

    pub fn with_time_source(mut self, time_source: TimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    /// `true` se a leitura é mais antiga que `other`.
    ///
    /// Instantes de relógios diferentes (backend × recebimento) não são
    /// comparáveis e nunca contam como mais antigos.
    pub fn is_older_than(&self, other: &TelemetrySample) -> bool {
        self.time_source == other.time_source && self.captured_at < other.captured_at
    }
}

// ──────────────────────────────────────────────
// Erros visíveis ao observador
// ──────────────────────────────────────────────

/// Categoria do último erro, exposta no [`SyncState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Requisição REST excedeu o timeout
    NetworkTimeout,
    /// HTTP não-2xx, falha de I/O ou `connect_error` do socket
    TransportError,
    /// Payload sem os campos numéricos obrigatórios
    MalformedPayload,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NetworkTimeout => f.write_str("timeout de rede"),
            ErrorKind::TransportError => f.write_str("erro de transporte"),
            ErrorKind::MalformedPayload => f.write_str("payload inválido"),
        }
    }
}

// ──────────────────────────────────────────────
// Estado observável
// ──────────────────────────────────────────────

/// Estado publicado aos observadores.
///
/// Depois que `current` recebe uma leitura, ele nunca volta a `None`:
/// falhas só congelam o valor exibido.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub current: Option<TelemetrySample>,
    pub is_connected: bool,
    pub last_error: Option<ErrorKind>,
}

impl Default for SyncState {
    fn default() -> Self {
        // Começa "conectado" até a primeira verificação responder
        Self {
            current: None,
            is_connected: true,
            last_error: None,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn default_state_is_optimistic() {
        let state = SyncState::default();
        assert!(state.current.is_none());
        assert!(state.is_connected);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn older_sample_detection() {
        let a = TelemetrySample::new(Some(10.0), None, MotorState::Idle, 0.0, at(100));
        let b = TelemetrySample::new(Some(10.0), None, MotorState::Idle, 0.0, at(101));
        assert!(a.is_older_than(&b));
        assert!(!b.is_older_than(&a));
        assert!(!a.is_older_than(&a.clone()));
    }

    #[test]
    fn different_clocks_are_not_compared() {
        let backend = TelemetrySample::new(Some(10.0), None, MotorState::Idle, 0.0, at(100));
        let received = TelemetrySample::new(Some(10.0), None, MotorState::Idle, 0.0, at(5_000))
            .with_time_source(TimeSource::Received);
        assert!(!backend.is_older_than(&received));
        assert!(!received.is_older_than(&backend));
    }

    #[test]
    fn motor_state_defaults_to_idle() {
        assert_eq!(MotorState::default(), MotorState::Idle);
        assert!(MotorState::Running.is_running());
    }
}
