use crate::domain::milestone::Milestone;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Budget and progress figures derived from a project's milestone set.
///
/// The project's `budget` ceiling is advisory and lives outside this core;
/// only milestone-derived figures are computed here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    /// Sum of all milestone amounts.
    pub total_committed: Decimal,
    /// Sum over milestones whose work is delivered (completed, paying, paid).
    pub total_completed: Decimal,
    /// Sum over milestones that have settled as paid.
    pub total_paid: Decimal,
    /// `round(total_completed / total_committed * 100)`, 0 when nothing is
    /// committed.
    pub progress_percent: u32,
}

impl ProjectSummary {
    pub const EMPTY: Self = Self {
        total_committed: Decimal::ZERO,
        total_completed: Decimal::ZERO,
        total_paid: Decimal::ZERO,
        progress_percent: 0,
    };
}

/// Pure aggregation over a milestone list snapshot. No I/O, recomputed on
/// every read; the store is the single source of truth.
pub fn summarize(milestones: &[Milestone]) -> ProjectSummary {
    let mut committed = Decimal::ZERO;
    let mut completed = Decimal::ZERO;
    let mut paid = Decimal::ZERO;

    for m in milestones {
        let amount = m.amount.value();
        committed += amount;
        if m.status.is_delivered() {
            completed += amount;
        }
        if m.status == crate::domain::milestone::MilestoneStatus::Paid {
            paid += amount;
        }
    }

    let progress_percent = if committed > Decimal::ZERO {
        (completed / committed * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u32()
            .unwrap_or(0)
    } else {
        0
    };

    ProjectSummary {
        total_committed: committed,
        total_completed: completed,
        total_paid: paid,
        progress_percent,
    }
}
