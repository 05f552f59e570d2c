//! Go/No-Go decision point
//!
//! Consulted once, after the budget plan is accepted and before any side
//! effect. A negative decision aborts the run.

use super::budget::BudgetPlan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Go,
    NoGo(String),
}

pub trait GoNoGo: Send + Sync {
    fn decide(&self, plan: &BudgetPlan) -> Decision;
}

/// Always proceeds
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl GoNoGo for AutoApprove {
    fn decide(&self, _plan: &BudgetPlan) -> Decision {
        Decision::Go
    }
}

/// Always declines with a fixed reason
#[derive(Debug, Clone)]
pub struct Deny(pub String);

impl GoNoGo for Deny {
    fn decide(&self, _plan: &BudgetPlan) -> Decision {
        Decision::NoGo(self.0.clone())
    }
}

/// Proceeds only while the estimated cost stays at or under a limit
#[derive(Debug, Clone, Copy)]
pub struct CostLimit(pub f64);

impl GoNoGo for CostLimit {
    fn decide(&self, plan: &BudgetPlan) -> Decision {
        if plan.estimated_cost <= self.0 {
            Decision::Go
        } else {
            Decision::NoGo(format!(
                "estimated cost {:.4} above approval limit {:.4}",
                plan.estimated_cost, self.0
            ))
        }
    }
}
