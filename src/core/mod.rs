pub mod accumulation;
mod error;
pub mod ltv;
pub mod metrics;
mod planner;
pub mod retirement;
pub mod scenario;
mod solver;
mod types;

pub use accumulation::Randomness;
pub use error::PlanError;
pub use planner::{PlanRequest, PlanResult, retirement_handoff, run_plan};
pub use solver::{
    GoalProblem, GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType, solve_goal,
};
pub use types::{
    AccumulationInputs, AccumulationResult, GoalDraft, GrowthMode, Holdings, LoanPosition,
    LtvReport, LtvSnapshot, MarginCallRung, PriceShockRow, ProjectionMetrics, ProjectionPoint,
    RetirementInputs, RetirementPhase, RetirementResult, RetirementState, RetirementStrategy,
    RiskLevel, ScenarioName, ScenarioOverrides, ScenarioParameters, SummaryRequest, YearLedger,
};
