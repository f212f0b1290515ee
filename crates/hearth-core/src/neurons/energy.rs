//! Energy neurons - optional PV/cost awareness
//!
//! These only join the pipeline when the household exposes the relevant
//! entities (PV production, electricity price, grid balance). They run in
//! the state layer.

use super::model::{EvalContext, Evaluate, NeuronError, NeuronKind, clamp01};

// ============================================================================
// PV FORECAST
// ============================================================================

/// Current PV production relative to installed capacity.
pub struct PvForecastNeuron {
    entity_ids: Vec<String>,
    pv_entity: String,
    capacity_kw: f64,
}

impl PvForecastNeuron {
    /// Construct over a PV production entity (kW) and plant capacity.
    pub fn new(pv_entity: impl Into<String>, capacity_kw: f64) -> Self {
        let pv_entity = pv_entity.into();
        Self {
            entity_ids: vec![pv_entity.clone()],
            pv_entity,
            capacity_kw: capacity_kw.max(0.1),
        }
    }
}

impl Evaluate for PvForecastNeuron {
    fn name(&self) -> &str {
        "pv_forecast"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let state = ctx
            .state_of(&self.pv_entity)
            .ok_or_else(|| NeuronError::MissingInput(self.pv_entity.clone()))?;
        let kw = state.numeric().ok_or_else(|| NeuronError::BadState {
            entity: self.pv_entity.clone(),
            state: state.state.clone(),
        })?;
        Ok(clamp01(kw / self.capacity_kw))
    }
}

// ============================================================================
// ENERGY COST
// ============================================================================

/// Electricity price attractiveness: 1.0 cheap, 0.0 expensive.
pub struct EnergyCostNeuron {
    entity_ids: Vec<String>,
    price_entity: String,
    cheap_ct: f64,
    expensive_ct: f64,
}

impl EnergyCostNeuron {
    /// Construct over a price entity (ct/kWh) with cheap/expensive pins.
    pub fn new(price_entity: impl Into<String>, cheap_ct: f64, expensive_ct: f64) -> Self {
        let price_entity = price_entity.into();
        Self {
            entity_ids: vec![price_entity.clone()],
            price_entity,
            cheap_ct,
            expensive_ct: expensive_ct.max(cheap_ct + 0.01),
        }
    }
}

impl Evaluate for EnergyCostNeuron {
    fn name(&self) -> &str {
        "energy_cost"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let state = ctx
            .state_of(&self.price_entity)
            .ok_or_else(|| NeuronError::MissingInput(self.price_entity.clone()))?;
        let price = state.numeric().ok_or_else(|| NeuronError::BadState {
            entity: self.price_entity.clone(),
            state: state.state.clone(),
        })?;
        Ok(clamp01(
            (self.expensive_ct - price) / (self.expensive_ct - self.cheap_ct),
        ))
    }
}

// ============================================================================
// GRID OPTIMIZATION
// ============================================================================

/// How favorable the grid balance is for flexible loads: production
/// surplus scores high, heavy import scores low.
pub struct GridOptimizationNeuron {
    entity_ids: Vec<String>,
    pv_entity: String,
    grid_entity: String,
    scale_kw: f64,
}

impl GridOptimizationNeuron {
    /// Construct over PV production and grid import entities (kW, import
    /// positive). `scale_kw` pins the extremes of the mapping.
    pub fn new(
        pv_entity: impl Into<String>,
        grid_entity: impl Into<String>,
        scale_kw: f64,
    ) -> Self {
        let pv_entity = pv_entity.into();
        let grid_entity = grid_entity.into();
        Self {
            entity_ids: vec![pv_entity.clone(), grid_entity.clone()],
            pv_entity,
            grid_entity,
            scale_kw: scale_kw.max(0.1),
        }
    }
}

impl Evaluate for GridOptimizationNeuron {
    fn name(&self) -> &str {
        "grid_optimization"
    }

    fn kind(&self) -> NeuronKind {
        NeuronKind::State
    }

    fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    fn evaluate(&self, ctx: &EvalContext) -> Result<f64, NeuronError> {
        let pv = ctx
            .state_of(&self.pv_entity)
            .and_then(|s| s.numeric())
            .unwrap_or(0.0);
        let import = ctx
            .state_of(&self.grid_entity)
            .and_then(|s| s.numeric())
            .ok_or_else(|| NeuronError::MissingInput(self.grid_entity.clone()))?;
        // Surplus (export or high PV with low import) maps towards 1
        let balance = pv - import;
        Ok(clamp01(0.5 + balance / (2.0 * self.scale_kw)))
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
    fn test_pv_fraction_of_capacity() {
        let neuron = PvForecastNeuron::new("sensor.pv_power", 10.0);
        assert_eq!(neuron.evaluate(&ctx(&[("sensor.pv_power", "5")])).unwrap(), 0.5);
        assert_eq!(neuron.evaluate(&ctx(&[("sensor.pv_power", "15")])).unwrap(), 1.0);
    }

    #[test]
    fn test_pv_errors_surface_for_sandboxing() {
        let neuron = PvForecastNeuron::new("sensor.pv_power", 10.0);
        assert!(matches!(
            neuron.evaluate(&ctx(&[])).unwrap_err(),
            NeuronError::MissingInput(_)
        ));
        assert!(matches!(
            neuron.evaluate(&ctx(&[("sensor.pv_power", "broken")])).unwrap_err(),
            NeuronError::BadState { .. }
        ));
    }

    #[test]
    fn test_cost_maps_between_pins() {
        let neuron = EnergyCostNeuron::new("sensor.price", 20.0, 40.0);
        assert_eq!(neuron.evaluate(&ctx(&[("sensor.price", "20")])).unwrap(), 1.0);
        assert_eq!(neuron.evaluate(&ctx(&[("sensor.price", "40")])).unwrap(), 0.0);
        assert_eq!(neuron.evaluate(&ctx(&[("sensor.price", "30")])).unwrap(), 0.5);
    }

    #[test]
    fn test_grid_balance() {
        let neuron = GridOptimizationNeuron::new("sensor.pv_power", "sensor.grid_import", 5.0);
        // Strong surplus
        let v = neuron
            .evaluate(&ctx(&[("sensor.pv_power", "8"), ("sensor.grid_import", "-2")]))
            .unwrap();
        assert!(v > 0.9);
        // Heavy import
        let v = neuron
            .evaluate(&ctx(&[("sensor.pv_power", "0"), ("sensor.grid_import", "6")]))
            .unwrap();
        assert!(v < 0.1);
    }
}
