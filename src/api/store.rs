use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::{GoalDraft, PlanError, RetirementStrategy};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: u64,
    pub goal_name: String,
    pub target_amount: f64,
    pub monthly_contribution: f64,
    pub total_months: u32,
    pub months_completed: u32,
    pub strategy: RetirementStrategy,
    /// Share of `total_months` completed, in percent.
    pub current_progress: f64,
}

/// Where saved goals live. The engine never touches this; the HTTP layer owns it.
pub trait GoalStore: Send + Sync {
    fn insert(&self, draft: GoalDraft) -> Goal;
    fn list(&self) -> Vec<Goal>;
    fn get(&self, id: u64) -> Option<Goal>;
    fn record_progress(&self, id: u64, months_completed: u32) -> Result<Goal, PlanError>;
}

/// Process-lifetime goal store. It only grows: there is no delete route and
/// no eviction, so every saved goal stays in memory until the server exits.
#[derive(Debug, Default)]
pub struct InMemoryGoalStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: u64,
    goals: BTreeMap<u64, Goal>,
}

impl InMemoryGoalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GoalStore for InMemoryGoalStore {
    fn insert(&self, draft: GoalDraft) -> Goal {
        let mut inner = self.lock();
        inner.next_id += 1;
        let goal = Goal {
            id: inner.next_id,
            goal_name: draft.goal_name,
            target_amount: draft.target_amount,
            monthly_contribution: draft.monthly_contribution,
            total_months: draft.total_months,
            months_completed: 0,
            strategy: draft.strategy,
            current_progress: 0.0,
        };
        inner.goals.insert(goal.id, goal.clone());
        goal
    }

    fn list(&self) -> Vec<Goal> {
        self.lock().goals.values().cloned().collect()
    }

    fn get(&self, id: u64) -> Option<Goal> {
        self.lock().goals.get(&id).cloned()
    }

    fn record_progress(&self, id: u64, months_completed: u32) -> Result<Goal, PlanError> {
        let mut inner = self.lock();
        let goal = inner
            .goals
            .get_mut(&id)
            .ok_or_else(|| PlanError::NotFound(format!("goal {id}")))?;
        goal.months_completed = months_completed.min(goal.total_months);
        goal.current_progress = if goal.total_months == 0 {
            100.0
        } else {
            goal.months_completed as f64 / goal.total_months as f64 * 100.0
        };
        Ok(goal.clone())
    }
}
