//! Network context neuron - optional link-quality awareness
//!
//! Joins the context layer when the household exposes latency and packet
//! loss sensors for its uplink. Poor connectivity drags the value down,
//! which the alert mood picks up.

use super::model::{EvalContext, Evaluate, NeuronError, NeuronKind, clamp01};

/// Uplink quality: 1.0 healthy, 0.0 down.
pub struct NetQualityNeuron {
    entity_ids: Vec<String>,
    latency_entity: Option<String>,
    loss_entity: Option<String>,
    latency_warning_ms: f64,
    latency_critical_ms: f64,
    loss_warning_pct: f64,
    loss_critical_pct: f64,
}

impl NetQualityNeuron {
    /// Construct over optional latency (ms) and packet loss (%) sensors.
    pub fn new(latency_entity: Option<String>, loss_entity: Option<String>) -> Self {
        let entity_ids = latency_entity
            .iter()
            .chain(loss_entity.iter())
            .cloned()
            .collect();
        Self {
            entity_ids,
            latency_entity,
            loss_entity,
            latency_warning_ms: 50.0,
            latency_critical_ms: 100.0,
            loss_warning_pct: 1.0,
            loss_critical_pct: 3.0,
        }
    }

    fn score(value: f64, warning: f64, critical: f64) -> f64 {
        if value <= warning {
            1.0
        } else if value >= critical {
            0.0
        } else {
            1.0 - (value - warning) / (critical - warning)
        }
    }
}

impl Evaluate for NetQualityNeuron {
    fn name(&self) -> &str {
        "net_quality"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::Context
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let mut scores = Vec::new();

        if let Some(entity) = &self.latency_entity {
            if let Some(latency) = ctx.state_of(entity).and_then(|s| s.numeric()) {
                scores.push(Self::score(
                    latency,
                    self.latency_warning_ms,
                    self.latency_critical_ms,
                ));
            }
        }
        if let Some(entity) = &self.loss_entity {
            if let Some(loss) = ctx.state_of(entity).and_then(|s| s.numeric()) {
                scores.push(Self::score(loss, self.loss_warning_pct, self.loss_critical_pct));
            }
        }

        if scores.is_empty() {
            return Err(NeuronError::MissingInput("net quality sensors".to_string()));
        }
        // The worst signal wins
        Ok(clamp01(scores.iter().cloned().fold(1.0, f64::min)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurons::model::EntityState;
    use chrono::Utc;

    fn ctx(states: &[(&str, &str)]) -> EvalContext {
        let mut ctx = EvalContext::new(Utc::now());
        for (id, state) in states {
            ctx.states.insert(id.to_string(), EntityState::new(*state));
        }
        ctx
    }

    #[test]
    fn test_healthy_link() {
        let neuron = NetQualityNeuron::new(
            Some("sensor.wan_latency".to_string()),
            Some("sensor.wan_loss".to_string()),
        );
        let v = neuron
            .evaluate(&ctx(&[("sensor.wan_latency", "12"), ("sensor.wan_loss", "0")]))
            .unwrap();
        assert_eq!(v, 1.0);
    }

    #[test]
    fn test_worst_signal_wins() {
        let neuron = NetQualityNeuron::new(
            Some("sensor.wan_latency".to_string()),
            Some("sensor.wan_loss".to_string()),
        );
        // Latency fine, loss critical
        let v = neuron
            .evaluate(&ctx(&[("sensor.wan_latency", "12"), ("sensor.wan_loss", "5")]))
            .unwrap();
        assert_eq!(v, 0.0);
    }

    #[test]
    fn test_degraded_latency_interpolates() {
        let neuron = NetQualityNeuron::new(Some("sensor.wan_latency".to_string()), None);
        let v = neuron
            .evaluate(&ctx(&[("sensor.wan_latency", "75")]))
            .unwrap();
        assert!((v - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_sensors_error() {
        let neuron = NetQualityNeuron::new(Some("sensor.wan_latency".to_string()), None);
        assert!(neuron.evaluate(&ctx(&[])).is_err());
    }
}
