//! Goal savings optimizer
//!
//! Greedy allocation of monthly savings across goals by priority.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{FinancialGoal, Priority};

/// Monthly amount a goal needs at a given priority
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalRequirement {
    pub goal_name: String,
    pub monthly_required: f64,
    #[serde(default)]
    pub priority: Priority,
}

impl From<&FinancialGoal> for GoalRequirement {
    fn from(goal: &FinancialGoal) -> Self {
        Self {
            goal_name: goal.goal_name.clone(),
            monthly_required: goal.monthly_saving().max(0.0),
            priority: goal.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoalAllocation {
    pub goal_name: String,
    pub priority: Priority,
    pub required: f64,
    pub allocated: f64,
    pub fully_funded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavingsPlan {
    /// Same order as the requirements passed in
    pub allocations: Vec<GoalAllocation>,
    pub total_required: f64,
    pub available_savings: f64,
    pub feasible: bool,
    pub remaining: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GoalSavingsOptimizer;

impl GoalSavingsOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// When savings fall short, goals are served high to low priority.
    /// The first goal that cannot be fully funded takes what is left and
    /// every goal after it gets nothing.
    pub fn optimize(&self, requirements: &[GoalRequirement], available_savings: f64) -> SavingsPlan {
        let total_required: f64 = requirements.iter().map(|r| r.monthly_required).sum();

        if available_savings >= total_required {
            let allocations = requirements
                .iter()
                .map(|r| allocation(r, r.monthly_required))
                .collect();
            return SavingsPlan {
                allocations,
                total_required,
                available_savings,
                feasible: true,
                remaining: available_savings - total_required,
            };
        }

        let mut order: Vec<usize> = (0..requirements.len()).collect();
        order.sort_by_key(|&i| requirements[i].priority.rank());

        let mut allocated = vec![0.0; requirements.len()];
        let mut budget = available_savings.max(0.0);

        for i in order {
            let needed = requirements[i].monthly_required;
            if budget >= needed {
                allocated[i] = needed;
                budget -= needed;
            } else {
                allocated[i] = budget;
                budget = 0.0;
                break;
            }
        }

        debug!(
            goals = requirements.len(),
            total_required,
            available_savings,
            "Savings short of goal requirements"
        );

        SavingsPlan {
            allocations: requirements
                .iter()
                .zip(allocated)
                .map(|(r, amount)| allocation(r, amount))
                .collect(),
            total_required,
            available_savings,
            feasible: false,
            remaining: budget,
        }
    }
}

fn allocation(requirement: &GoalRequirement, allocated: f64) -> GoalAllocation {
    GoalAllocation {
        goal_name: requirement.goal_name.clone(),
        priority: requirement.priority,
        required: requirement.monthly_required,
        allocated,
        fully_funded: allocated >= requirement.monthly_required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, amount: f64, priority: Priority) -> GoalRequirement {
        GoalRequirement {
            goal_name: name.to_string(),
            monthly_required: amount,
            priority,
        }
    }

    #[test]
    fn test_feasible_plan_funds_everything() {
        let plan = GoalSavingsOptimizer::new().optimize(
            &[req("a", 100.0, Priority::Low), req("b", 50.0, Priority::High)],
            400.0,
        );
        assert!(plan.feasible);
        assert_eq!(plan.remaining, 250.0);
        assert!(plan.allocations.iter().all(|a| a.fully_funded));
    }

    #[test]
    fn test_starves_the_tail() {
        let plan = GoalSavingsOptimizer::new().optimize(
            &[
                req("high", 100.0, Priority::High),
                req("medium", 200.0, Priority::Medium),
                req("low", 300.0, Priority::Low),
            ],
            250.0,
        );
        let amounts: Vec<f64> = plan.allocations.iter().map(|a| a.allocated).collect();
        assert_eq!(amounts, vec![100.0, 150.0, 0.0]);
        assert!(!plan.feasible);
        assert_eq!(plan.remaining, 0.0);
        assert_eq!(plan.total_required, 600.0);
    }

    #[test]
    fn test_allocations_keep_input_order() {
        let plan = GoalSavingsOptimizer::new().optimize(
            &[
                req("low", 300.0, Priority::Low),
                req("high", 100.0, Priority::High),
                req("medium-1", 50.0, Priority::Medium),
                req("medium-2", 50.0, Priority::Medium),
            ],
            170.0,
        );
        let names: Vec<&str> = plan.allocations.iter().map(|a| a.goal_name.as_str()).collect();
        assert_eq!(names, vec!["low", "high", "medium-1", "medium-2"]);

        let amounts: Vec<f64> = plan.allocations.iter().map(|a| a.allocated).collect();
        // ties are served in input order
        assert_eq!(amounts, vec![0.0, 100.0, 50.0, 20.0]);
    }

    #[test]
    fn test_zero_savings() {
        let plan = GoalSavingsOptimizer::new().optimize(&[req("a", 10.0, Priority::High)], 0.0);
        assert!(!plan.feasible);
        assert_eq!(plan.allocations[0].allocated, 0.0);
    }
}
