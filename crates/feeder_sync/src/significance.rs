//! Filtro de significância – decide *quando* uma leitura é aplicada.
//!
//! Ruído da célula de carga não deve fazer o valor exibido tremer, mas
//! transições do motor precisam aparecer sem atraso perceptível.

use feeder_core::config::ClientConfig;
use feeder_core::types::TelemetrySample;
use std::time::{Duration, Instant};

/// Resultado da avaliação de uma leitura.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ApplyNow,
    ApplyDelayed(Duration),
    /// Leitura mais antiga que a exibida
    Drop,
}

/// Regras de significância (thresholds na unidade do sensor).
#[derive(Debug, Clone)]
pub struct SignificanceFilter {
    pub weight_threshold: f64,
    pub distance_threshold: f64,
    pub delay: Duration,
}

impl Default for SignificanceFilter {
    fn default() -> Self {
        Self {
            weight_threshold: 1.0,
            distance_threshold: 1.0,
            delay: Duration::from_millis(100),
        }
    }
}

impl SignificanceFilter {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            weight_threshold: config.weight_threshold,
            distance_threshold: config.distance_threshold,
            delay: config.debounce(),
        }
    }

    /// Avalia `incoming` contra a leitura exibida (`previous`).
    ///
    /// `previous` é sempre o valor do cache, nunca a leitura pendente:
    /// uma sequência de jitter não desloca o valor aos poucos.
    pub fn evaluate(
        &self,
        previous: Option<&TelemetrySample>,
        incoming: &TelemetrySample,
    ) -> Decision {
        let Some(previous) = previous else {
            return Decision::ApplyNow;
        };

        if incoming.is_older_than(previous) {
            return Decision::Drop;
        }

        if incoming.motor_state != previous.motor_state {
            return Decision::ApplyNow;
        }

        if changed(previous.weight, incoming.weight, self.weight_threshold)
            || changed(
                previous.tank_distance,
                incoming.tank_distance,
                self.distance_threshold,
            )
        {
            return Decision::ApplyNow;
        }

        Decision::ApplyDelayed(self.delay)
    }
}

/// Só dois valores presentes podem ser ruído; qualquer `None` (sensor
/// ausente, aparecendo ou sumindo) aplica na hora.
fn changed(old: Option<f64>, new: Option<f64>, threshold: f64) -> bool {
    match (old, new) {
        (Some(old), Some(new)) => (new - old).abs() >= threshold,
        _ => true,
    }
}

/// Leitura agendada e ainda não aplicada. No máximo uma por cliente.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub sample: TelemetrySample,
    pub due: Instant,
}

impl PendingUpdate {
    pub fn new(sample: TelemetrySample, now: Instant, delay: Duration) -> Self {
        Self {
            sample,
            due: now + delay,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use feeder_core::types::{MotorState, TimeSource};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn reading(weight: f64, tank: f64, motor: MotorState, secs: i64) -> TelemetrySample {
        TelemetrySample::new(Some(weight), Some(tank), motor, 0.0, at(secs))
    }

    #[test]
    fn first_sample_applies_now() {
        let filter = SignificanceFilter::default();
        let incoming = reading(100.0, 50.0, MotorState::Idle, 10);
        assert_eq!(filter.evaluate(None, &incoming), Decision::ApplyNow);
    }

    #[test]
    fn motor_transition_is_never_debounced() {
        let filter = SignificanceFilter::default();
        let previous = reading(100.0, 50.0, MotorState::Idle, 10);
        let incoming = reading(100.1, 50.0, MotorState::Running, 11);
        assert_eq!(filter.evaluate(Some(&previous), &incoming), Decision::ApplyNow);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let filter = SignificanceFilter::default();
        let previous = reading(100.0, 50.0, MotorState::Idle, 10);

        let exactly_one = reading(101.0, 50.0, MotorState::Idle, 11);
        assert_eq!(filter.evaluate(Some(&previous), &exactly_one), Decision::ApplyNow);

        let just_below = reading(100.99, 50.0, MotorState::Idle, 11);
        assert_eq!(
            filter.evaluate(Some(&previous), &just_below),
            Decision::ApplyDelayed(Duration::from_millis(100))
        );
    }

    #[test]
    fn tank_change_alone_is_significant() {
        let filter = SignificanceFilter::default();
        let previous = reading(100.0, 50.0, MotorState::Idle, 10);
        let incoming = reading(100.0, 48.5, MotorState::Idle, 11);
        assert_eq!(filter.evaluate(Some(&previous), &incoming), Decision::ApplyNow);
    }

    #[test]
    fn sensor_appearing_is_significant() {
        let filter = SignificanceFilter::default();
        let previous = TelemetrySample::new(None, Some(50.0), MotorState::Idle, 0.0, at(10));
        let incoming = reading(0.2, 50.0, MotorState::Idle, 11);
        assert_eq!(filter.evaluate(Some(&previous), &incoming), Decision::ApplyNow);
    }

    #[test]
    fn absent_sensors_apply_immediately() {
        let filter = SignificanceFilter::default();
        let offline = |secs| TelemetrySample::new(None, None, MotorState::Idle, 0.0, at(secs));
        assert_eq!(filter.evaluate(Some(&offline(10)), &offline(11)), Decision::ApplyNow);

        // Peso presente, tanque ausente nos dois: também não é debounced
        let previous = TelemetrySample::new(Some(100.0), None, MotorState::Idle, 0.0, at(10));
        let incoming = TelemetrySample::new(Some(100.2), None, MotorState::Idle, 0.0, at(11));
        assert_eq!(filter.evaluate(Some(&previous), &incoming), Decision::ApplyNow);
    }

    #[test]
    fn receipt_time_is_never_stale_against_backend_time() {
        let filter = SignificanceFilter::default();
        let previous = reading(100.0, 50.0, MotorState::Idle, 20_000);
        let incoming = reading(80.0, 50.0, MotorState::Running, 19)
            .with_time_source(TimeSource::Received);
        assert_eq!(filter.evaluate(Some(&previous), &incoming), Decision::ApplyNow);
    }

    #[test]
    fn stale_sample_is_dropped() {
        let filter = SignificanceFilter::default();
        let previous = reading(100.0, 50.0, MotorState::Idle, 20);
        let incoming = reading(150.0, 50.0, MotorState::Running, 19);
        assert_eq!(filter.evaluate(Some(&previous), &incoming), Decision::Drop);

        // Mesmo instante não é "mais antigo"
        let same_time = reading(150.0, 50.0, MotorState::Idle, 20);
        assert_eq!(filter.evaluate(Some(&previous), &same_time), Decision::ApplyNow);
    }

    #[test]
    fn thresholds_follow_config() {
        let config = ClientConfig {
            weight_threshold: 5.0,
            debounce_ms: 300,
            ..Default::default()
        };
        let filter = SignificanceFilter::from_config(&config);
        let previous = reading(100.0, 50.0, MotorState::Idle, 10);
        let incoming = reading(104.0, 50.0, MotorState::Idle, 11);
        assert_eq!(
            filter.evaluate(Some(&previous), &incoming),
            Decision::ApplyDelayed(Duration::from_millis(300))
        );
    }

    #[test]
    fn pending_update_is_due_at_deadline() {
        let now = Instant::now();
        let pending = PendingUpdate::new(reading(1.0, 1.0, MotorState::Idle, 1), now, Duration::from_millis(100));
        assert!(!pending.is_due(now + Duration::from_millis(99)));
        assert!(pending.is_due(now + Duration::from_millis(100)));
    }
}
