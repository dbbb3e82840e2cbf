//! Sistema de alertas – níveis e avaliação de thresholds do tanque.

use crate::config::AlertThresholds;
use crate::types::TelemetrySample;
use serde::{Deserialize, Serialize};

/// Nível de alerta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

/// Um alerta disparado.
#[derive(Debug, Clone)]
pub struct Alert {
    pub metric: String,
    pub label: String,
    pub value: f64,
    pub unit: String,
    pub level: AlertLevel,
}

/// Avalia uma leitura contra os thresholds e retorna alertas.
pub fn evaluate_alerts(sample: &TelemetrySample, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    // Nível do tanque
    if let Some(level) = sample.tank_distance {
        check_low(
            &mut alerts,
            "tank_level",
            "Nível do tanque",
            level,
            "%",
            thresholds.tank_warning_percent,
            thresholds.tank_critical_percent,
        );
    }

    alerts
}

/// Métrica em que valores baixos são ruins.
fn check_low(
    alerts: &mut Vec<Alert>,
    metric: &str,
    label: &str,
    value: f64,
    unit: &str,
    warn: f64,
    crit: f64,
) {
    if value <= 0.0 {
        return; // Sensor não disponível
    }
    let level = level_for_tank(value, warn, crit);
    if level == AlertLevel::Normal {
        return;
    }

    alerts.push(Alert {
        metric: metric.into(),
        label: label.into(),
        value,
        unit: unit.into(),
        level,
    });
}

/// Retorna o [`AlertLevel`] do nível do tanque dado os thresholds.
pub fn level_for_tank(value: f64, warn: f64, crit: f64) -> AlertLevel {
    if value < crit {
        AlertLevel::Critical
    } else if value < warn {
        AlertLevel::Warning
    } else {
        AlertLevel::Normal
    }
}

/// Maior nível entre os alertas, `Normal` se não houver nenhum.
pub fn highest_level(alerts: &[Alert]) -> AlertLevel {
    alerts
        .iter()
        .map(|a| a.level)
        .max()
        .unwrap_or(AlertLevel::Normal)
}
