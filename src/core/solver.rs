use serde::Serialize;
use tracing::debug;

use super::accumulation::{self, Randomness};
use super::error::PlanError;
use super::retirement;
use super::types::{AccumulationInputs, GrowthMode, RetirementInputs, ScenarioParameters};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GoalType {
    RequiredContribution,
    MaxIncome,
}

/// What to solve for. Candidates are always evaluated in smooth mode.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GoalProblem {
    /// Smallest monthly contribution whose final value reaches `target_value`.
    RequiredContribution {
        accumulation: AccumulationInputs,
        target_value: f64,
    },
    /// Largest desired annual income that keeps the retirement viable.
    MaxIncome { retirement: RetirementInputs },
}

impl GoalProblem {
    pub fn goal_type(&self) -> GoalType {
        match self {
            GoalProblem::RequiredContribution { .. } => GoalType::RequiredContribution,
            GoalProblem::MaxIncome { .. } => GoalType::MaxIncome,
        }
    }
}

/// Upper bound on bisection steps a caller may request.
pub const MAX_SOLVE_ITERATIONS: u32 = 200;
/// Smallest accepted bracket width, in the units of the searched value.
pub const MIN_SOLVE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl GoalSolveConfig {
    /// Checks the search bracket and the stopping rules.
    pub fn validate(&self) -> Result<(), PlanError> {
        if !self.search_min.is_finite() || !self.search_max.is_finite() {
            return Err(PlanError::invalid("searchMin/searchMax", "must be finite"));
        }
        if self.search_min < 0.0 {
            return Err(PlanError::invalid("searchMin", "must be >= 0"));
        }
        if self.search_max <= self.search_min {
            return Err(PlanError::invalid(
                "searchMax",
                "must be greater than searchMin",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < MIN_SOLVE_TOLERANCE {
            return Err(PlanError::invalid("tolerance", "must be >= 0.000001"));
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_SOLVE_ITERATIONS {
            return Err(PlanError::invalid(
                "maxIterations",
                "must be between 1 and 200",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub outcome_value: f64,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub solved_value: Option<f64>,
    /// Final value (contribution goals) or final net worth (income goals) at the solution.
    pub achieved_value: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

pub fn solve_goal(
    problem: &GoalProblem,
    scenario: &ScenarioParameters,
    config: GoalSolveConfig,
) -> Result<GoalSolveResult, PlanError> {
    validate_config(problem, config)?;

    let mut iterations = Vec::new();
    let low_eval = evaluate_candidate(problem, scenario, config.search_min);
    let high_eval = evaluate_candidate(problem, scenario, config.search_max);

    let mut solved_value = None;
    let mut converged = false;
    let feasible;
    let message;

    match problem.goal_type() {
        GoalType::RequiredContribution => {
            if low_eval.satisfied {
                solved_value = Some(config.search_min);
                converged = true;
                feasible = true;
                message = "Already meets target at lower contribution bound.".to_string();
            } else if !high_eval.satisfied {
                feasible = false;
                message = "No feasible contribution found within the search bounds.".to_string();
            } else {
                let (value, done) = bisect(problem, scenario, config, true, &mut iterations);
                solved_value = Some(value);
                converged = done;
                feasible = true;
                message = if converged {
                    "Solved required contribution.".to_string()
                } else {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                };
            }
        }
        GoalType::MaxIncome => {
            if !low_eval.satisfied {
                feasible = false;
                message = "No feasible income found within the search bounds.".to_string();
            } else if high_eval.satisfied {
                solved_value = Some(config.search_max);
                converged = true;
                feasible = true;
                message =
                    "Upper income bound is still viable; increase search max for higher target."
                        .to_string();
            } else {
                let (value, done) = bisect(problem, scenario, config, false, &mut iterations);
                solved_value = Some(value);
                converged = done;
                feasible = true;
                message = if converged {
                    "Solved maximum sustainable income.".to_string()
                } else {
                    "Reached max iterations before tolerance was met; returning best estimate."
                        .to_string()
                };
            }
        }
    }

    let achieved_value =
        solved_value.map(|value| evaluate_candidate(problem, scenario, value).outcome_value);

    debug!(
        goal_type = ?problem.goal_type(),
        ?solved_value,
        iterations = iterations.len(),
        converged,
        "goal solve finished"
    );

    Ok(GoalSolveResult {
        goal_type: problem.goal_type(),
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        solved_value,
        achieved_value,
        iterations,
        converged,
        feasible,
        message,
    })
}

/// Narrows `[search_min, search_max]` around the satisfied/unsatisfied boundary.
/// With `minimize`, the low end is unsatisfied and the result is the high end;
/// otherwise the low end is satisfied and the result is the low end.
fn bisect(
    problem: &GoalProblem,
    scenario: &ScenarioParameters,
    config: GoalSolveConfig,
    minimize: bool,
    iterations: &mut Vec<GoalSolveIteration>,
) -> (f64, bool) {
    let mut lo = config.search_min;
    let mut hi = config.search_max;
    let mut it = 0;
    while it < config.max_iterations {
        it += 1;
        let mid = (lo + hi) * 0.5;
        let eval = evaluate_candidate(problem, scenario, mid);
        iterations.push(GoalSolveIteration {
            iteration: it,
            lower_bound: lo,
            upper_bound: hi,
            candidate_value: mid,
            outcome_value: eval.outcome_value,
            satisfied: eval.satisfied,
        });

        if eval.satisfied == minimize {
            hi = mid;
        } else {
            lo = mid;
        }

        if (hi - lo).abs() <= config.tolerance {
            return (if minimize { hi } else { lo }, true);
        }
    }
    (if minimize { hi } else { lo }, false)
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    outcome_value: f64,
    satisfied: bool,
}

fn evaluate_candidate(
    problem: &GoalProblem,
    scenario: &ScenarioParameters,
    candidate_value: f64,
) -> CandidateEval {
    match *problem {
        GoalProblem::RequiredContribution {
            accumulation,
            target_value,
        } => {
            let inputs = AccumulationInputs {
                monthly_contribution: candidate_value.max(0.0),
                mode: GrowthMode::Smooth,
                ..accumulation
            };
            // Smooth mode never draws from the generator.
            let mut rng = Randomness::Seeded(0).into_rng();
            let result = accumulation::simulate(&inputs, scenario, &mut rng);
            CandidateEval {
                outcome_value: result.final_value,
                satisfied: result.final_value + 1e-9 >= target_value,
            }
        }
        GoalProblem::MaxIncome { retirement } => {
            let inputs = RetirementInputs {
                desired_annual_income: candidate_value.max(0.0),
                ..retirement
            };
            let result = retirement::simulate(&inputs, scenario);
            CandidateEval {
                outcome_value: result.final_net_worth,
                satisfied: result.viable,
            }
        }
    }
}

fn validate_config(problem: &GoalProblem, config: GoalSolveConfig) -> Result<(), PlanError> {
    config.validate()?;
    if let GoalProblem::RequiredContribution { target_value, .. } = problem {
        if !target_value.is_finite() || *target_value <= 0.0 {
            return Err(PlanError::invalid("targetValue", "must be > 0"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accumulation::monthly_rate;
    use crate::core::metrics::required_monthly_contribution;
    use crate::core::scenario::resolve;
    use crate::core::types::{Holdings, RetirementStrategy, ScenarioName, ScenarioOverrides};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn flat_scenario() -> ScenarioParameters {
        let overrides = ScenarioOverrides {
            growth_rate_pct: Some(0.0),
            volatility_pct: Some(0.0),
            inflation_pct: Some(0.0),
            withdrawal_rate_pct: Some(4.0),
            loan_interest_rate_pct: Some(0.0),
            post_retirement_growth_pct: Some(0.0),
            target_annual_ltv_pct: Some(25.0),
        };
        resolve(ScenarioName::Custom, Some(&overrides)).expect("custom scenario")
    }

    fn dollar_accumulation(years: u32) -> AccumulationInputs {
        AccumulationInputs {
            holdings: Holdings::Dollars(0.0),
            starting_price: 50_000.0,
            monthly_contribution: 0.0,
            years,
            mode: GrowthMode::Volatile,
            target_value: None,
        }
    }

    fn config(search_max: f64) -> GoalSolveConfig {
        GoalSolveConfig {
            search_min: 0.0,
            search_max,
            tolerance: 0.5,
            max_iterations: 40,
        }
    }

    #[test]
    fn required_contribution_solver_finds_deterministic_solution() {
        let problem = GoalProblem::RequiredContribution {
            accumulation: dollar_accumulation(1),
            target_value: 1_200.0,
        };
        let result = solve_goal(&problem, &flat_scenario(), config(500.0)).expect("must solve");
        assert!(result.feasible);
        assert!(result.converged);
        assert_close(result.solved_value.expect("value expected"), 100.0, 1.0);
        assert!(result.achieved_value.expect("achieved") >= 1_200.0 - 1e-6);
        assert!(!result.iterations.is_empty());
    }

    #[test]
    fn required_contribution_solver_agrees_with_closed_form() {
        let scenario = resolve(ScenarioName::Moderate, None).expect("preset");
        let mut accumulation = dollar_accumulation(10);
        accumulation.holdings = Holdings::Dollars(10_000.0);
        let problem = GoalProblem::RequiredContribution {
            accumulation,
            target_value: 2_000_000.0,
        };
        let result = solve_goal(&problem, &scenario, config(20_000.0)).expect("must solve");
        let closed_form = required_monthly_contribution(
            2_000_000.0,
            10_000.0,
            monthly_rate(scenario.growth_rate()),
            120,
        )
        .expect("defined");
        assert_close(result.solved_value.expect("value"), closed_form, 1.0);
    }

    #[test]
    fn required_contribution_solver_handles_bitcoin_holdings() {
        let scenario = resolve(ScenarioName::Conservative, None).expect("preset");
        let mut accumulation = dollar_accumulation(5);
        accumulation.holdings = Holdings::Bitcoin(0.1);
        let problem = GoalProblem::RequiredContribution {
            accumulation,
            target_value: 100_000.0,
        };
        let result = solve_goal(&problem, &scenario, config(10_000.0)).expect("must solve");
        assert!(result.feasible);
        assert!(result.solved_value.expect("value") > 0.0);
        assert!(result.achieved_value.expect("achieved") >= 100_000.0 - 1e-6);
    }

    #[test]
    fn required_contribution_already_met_returns_lower_bound() {
        let mut accumulation = dollar_accumulation(1);
        accumulation.holdings = Holdings::Dollars(5_000.0);
        let problem = GoalProblem::RequiredContribution {
            accumulation,
            target_value: 1_000.0,
        };
        let result = solve_goal(&problem, &flat_scenario(), config(500.0)).expect("must solve");
        assert_eq!(result.solved_value, Some(0.0));
        assert!(result.iterations.is_empty());
    }

    #[test]
    fn required_contribution_solver_reports_infeasible_when_bounds_too_low() {
        let problem = GoalProblem::RequiredContribution {
            accumulation: dollar_accumulation(1),
            target_value: 1_200.0,
        };
        let result = solve_goal(&problem, &flat_scenario(), config(50.0)).expect("must return");
        assert!(!result.feasible);
        assert!(result.solved_value.is_none());
        assert!(result.achieved_value.is_none());
    }

    #[test]
    fn max_income_solver_finds_deterministic_solution() {
        let problem = GoalProblem::MaxIncome {
            retirement: RetirementInputs {
                starting_btc: 10.0,
                starting_price: 10_000.0,
                retirement_years: 10,
                desired_annual_income: 0.0,
                strategy: RetirementStrategy::Sell,
            },
        };
        let result = solve_goal(&problem, &flat_scenario(), config(50_000.0)).expect("must solve");
        assert!(result.feasible);
        let solved = result.solved_value.expect("value expected");
        assert!(solved < 10_000.0);
        assert_close(solved, 10_000.0, 1.0);
    }

    #[test]
    fn max_income_reports_infeasible_when_nothing_is_viable() {
        let problem = GoalProblem::MaxIncome {
            retirement: RetirementInputs {
                starting_btc: 0.0,
                starting_price: 10_000.0,
                retirement_years: 5,
                desired_annual_income: 0.0,
                strategy: RetirementStrategy::Sell,
            },
        };
        let result = solve_goal(&problem, &flat_scenario(), config(1_000.0)).expect("must return");
        assert!(!result.feasible);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let problem = GoalProblem::RequiredContribution {
            accumulation: dollar_accumulation(1),
            target_value: 1_200.0,
        };
        let mut bad = config(500.0);
        bad.search_max = 0.0;
        assert!(matches!(
            solve_goal(&problem, &flat_scenario(), bad),
            Err(PlanError::InvalidInput { .. })
        ));

        let mut bad = config(500.0);
        bad.tolerance = 0.0;
        assert!(solve_goal(&problem, &flat_scenario(), bad).is_err());
    }

    #[test]
    fn oversized_iteration_budget_is_rejected_before_any_work() {
        let problem = GoalProblem::RequiredContribution {
            accumulation: dollar_accumulation(1),
            target_value: 1_200.0,
        };
        let mut bad = config(500.0);
        bad.max_iterations = u32::MAX;
        let err = solve_goal(&problem, &flat_scenario(), bad).expect_err("must fail");
        assert_eq!(
            err,
            PlanError::invalid("maxIterations", "must be between 1 and 200")
        );

        let mut at_cap = config(500.0);
        at_cap.max_iterations = MAX_SOLVE_ITERATIONS;
        assert!(solve_goal(&problem, &flat_scenario(), at_cap).is_ok());
    }

    #[test]
    fn vanishing_tolerance_is_rejected() {
        let problem = GoalProblem::RequiredContribution {
            accumulation: dollar_accumulation(1),
            target_value: 1_200.0,
        };
        let mut bad = config(500.0);
        bad.tolerance = 1e-300;
        let err = solve_goal(&problem, &flat_scenario(), bad).expect_err("must fail");
        assert_eq!(err, PlanError::invalid("tolerance", "must be >= 0.000001"));
    }
}
