//! Formatação das linhas de estado e alertas do monitor.

use chrono::Local;
use feeder_core::alerts::{Alert, AlertLevel, highest_level};
use feeder_core::types::{SyncState, TelemetrySample};

/// Rótulo do tanque, mesmas faixas do painel do alimentador.
pub fn tank_status(level: f64) -> &'static str {
    if level >= 60.0 {
        "bom"
    } else if level >= 30.0 {
        "médio"
    } else {
        "baixo"
    }
}

fn reading_line(sample: &TelemetrySample) -> String {
    let weight = sample
        .weight
        .map(|w| format!("{w:.1} g"))
        .unwrap_or_else(|| "--".into());
    let tank = sample
        .tank_distance
        .map(|t| format!("{t:.0}% ({})", tank_status(t)))
        .unwrap_or_else(|| "--".into());

    format!(
        "peso {weight} | tanque {tank} | motor {} | hoje {:.1} g | {}",
        sample.motor_state,
        sample.consumed_today,
        sample.captured_at.with_timezone(&Local).format("%H:%M:%S")
    )
}

/// Uma linha por estado publicado.
pub fn summary(state: &SyncState) -> String {
    let status = if state.is_connected {
        "● online"
    } else {
        "○ offline"
    };

    let body = match &state.current {
        Some(sample) => reading_line(sample),
        None => "aguardando primeira leitura".into(),
    };

    match state.last_error {
        Some(kind) => format!("{status} | {body} | último erro: {kind}"),
        None => format!("{status} | {body}"),
    }
}

pub fn alert_line(alert: &Alert) -> String {
    format!(
        "[{:?}] {}: {:.0}{}",
        alert.level, alert.label, alert.value, alert.unit
    )
}

/// Lembra o último nível para só avisar quando ele muda.
#[derive(Debug)]
pub struct AlertWatch {
    last: AlertLevel,
}

impl Default for AlertWatch {
    fn default() -> Self {
        Self {
            last: AlertLevel::Normal,
        }
    }
}

impl AlertWatch {
    /// Novo nível, se diferente do anterior.
    pub fn update(&mut self, alerts: &[Alert]) -> Option<AlertLevel> {
        let level = highest_level(alerts);
        if level == self.last {
            return None;
        }
        self.last = level;
        Some(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use feeder_core::types::{ErrorKind, MotorState};

    fn alert(level: AlertLevel) -> Alert {
        Alert {
            metric: "tank_level".into(),
            label: "Nível do tanque".into(),
            value: 15.0,
            unit: "%".into(),
            level,
        }
    }

    #[test]
    fn tank_status_bands() {
        assert_eq!(tank_status(60.0), "bom");
        assert_eq!(tank_status(59.9), "médio");
        assert_eq!(tank_status(30.0), "médio");
        assert_eq!(tank_status(29.9), "baixo");
    }

    #[test]
    fn summary_without_reading() {
        let state = SyncState::default();
        assert_eq!(summary(&state), "● online | aguardando primeira leitura");
    }

    #[test]
    fn summary_shows_frozen_value_and_error() {
        let state = SyncState {
            current: Some(TelemetrySample::new(
                Some(152.4),
                None,
                MotorState::Running,
                80.5,
                Utc::now(),
            )),
            is_connected: false,
            last_error: Some(ErrorKind::NetworkTimeout),
        };
        let line = summary(&state);
        assert!(line.starts_with("○ offline | peso 152.4 g | tanque -- | motor girando | hoje 80.5 g"));
        assert!(line.ends_with("último erro: timeout de rede"));
    }

    #[test]
    fn alert_watch_reports_changes_only() {
        let mut watch = AlertWatch::default();
        assert_eq!(watch.update(&[]), None);
        assert_eq!(watch.update(&[alert(AlertLevel::Warning)]), Some(AlertLevel::Warning));
        assert_eq!(watch.update(&[alert(AlertLevel::Warning)]), None);
        assert_eq!(watch.update(&[]), Some(AlertLevel::Normal));
    }

    #[test]
    fn alert_line_format() {
        assert_eq!(alert_line(&alert(AlertLevel::Critical)), "[Critical] Nível do tanque: 15%");
    }
}
