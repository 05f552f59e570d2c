//! Pre-flight budget plan
//!
//! Computed and checked before any AI call or other side effect.

use serde::Serialize;

use crate::config::BudgetConfig;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BudgetPlan {
    pub lite_calls: u32,
    pub full_calls: u32,
    pub compose_calls: u32,
    pub estimated_cost: f64,
}

impl BudgetPlan {
    /// **Cost:** `per_call · (lite + full · full_multiplier + compose · compose_multiplier)`
    pub fn new(lite_calls: u32, full_calls: u32, compose_calls: u32, config: &BudgetConfig) -> Self {
        let estimated_cost = estimate_cost(lite_calls, full_calls, compose_calls, config);
        Self {
            lite_calls,
            full_calls,
            compose_calls,
            estimated_cost,
        }
    }

    pub fn total_calls(&self) -> u32 {
        self.lite_calls + self.full_calls + self.compose_calls
    }

    /// Refuse a plan over either ceiling unless `override_ceiling`
    pub fn check(&self, config: &BudgetConfig, override_ceiling: bool) -> PipelineResult<()> {
        let over_calls = self.total_calls() > config.max_calls;
        let over_cost = self.estimated_cost > config.max_cost;
        if (over_calls || over_cost) && !override_ceiling {
            return Err(PipelineError::Budget {
                planned_calls: self.total_calls(),
                max_calls: config.max_calls,
                estimated_cost: self.estimated_cost,
                max_cost: config.max_cost,
            });
        }
        if over_calls || over_cost {
            tracing::warn!(
                planned_calls = self.total_calls(),
                estimated_cost = self.estimated_cost,
                "Budget ceiling exceeded, proceeding under explicit override"
            );
        }
        Ok(())
    }

    pub fn display_string(&self) -> String {
        format!(
            "Plan: {} lite, {} full, {} compose calls, estimated cost {:.4}",
            self.lite_calls, self.full_calls, self.compose_calls, self.estimated_cost
        )
    }
}

pub fn estimate_cost(lite_calls: u32, full_calls: u32, compose_calls: u32, config: &BudgetConfig) -> f64 {
    config.per_call_cost
        * (f64::from(lite_calls)
            + f64::from(full_calls) * config.full_multiplier
            + f64::from(compose_calls) * config.compose_multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn config() -> BudgetConfig {
        BudgetConfig {
            max_calls: 20,
            max_cost: 0.05,
            per_call_cost: 0.001,
            full_multiplier: 4.0,
            compose_multiplier: 6.0,
        }
    }

    #[test]
    fn test_cost_uses_multipliers() {
        let plan = BudgetPlan::new(10, 2, 1, &config());
        assert_eq!(plan.total_calls(), 13);
        assert!((plan.estimated_cost - 0.024).abs() < 1e-12);
        plan.check(&config(), false).unwrap();
    }

    #[test]
    fn test_call_ceiling_enforced() {
        let plan = BudgetPlan::new(30, 3, 1, &config());
        let err = plan.check(&config(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Budget);
        assert!(plan.check(&config(), true).is_ok());
    }

    #[test]
    fn test_cost_ceiling_enforced() {
        let mut cfg = config();
        cfg.max_calls = 1000;
        cfg.full_multiplier = 100.0;
        let plan = BudgetPlan::new(1, 1, 0, &cfg);
        assert_eq!(plan.check(&cfg, false).unwrap_err().kind(), ErrorKind::Budget);
    }
}
