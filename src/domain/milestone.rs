use crate::error::EngineError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque milestone identifier, assigned at creation and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestoneId(Uuid);

impl MilestoneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for MilestoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MilestoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the owning project. Projects live outside this core, so the
/// id is carried as an opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A non-negative USD amount with `rust_decimal` precision.
///
/// Amounts are immutable once a milestone is created; an amendment is modeled
/// as a replacement milestone so the payment audit trail stays intact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, EngineError> {
        if value >= Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(EngineError::Validation(format!(
                "amount must be non-negative, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Whole cents, as the gateway wants them. Saturates on amounts beyond
    /// the u64 range.
    pub fn to_cents(&self) -> u64 {
        (self.0 * Decimal::ONE_HUNDRED)
            .round()
            .to_u64()
            .unwrap_or(u64::MAX)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = EngineError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Milestone lifecycle status.
///
/// Legal edges: `pending → completed → paying → paid`, with
/// `paying → failed` on a declined or timed-out charge and `failed → paying`
/// as the retry edge. `paid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    Pending,
    Completed,
    Paying,
    Paid,
    Failed,
}

impl MilestoneStatus {
    pub fn can_transition(self, next: MilestoneStatus) -> bool {
        use MilestoneStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Completed, Paying) | (Paying, Paid) | (Paying, Failed)
                | (Failed, Paying)
        )
    }

    /// Name/description/due-date edits are frozen once payment is underway.
    pub fn is_frozen(self) -> bool {
        matches!(self, MilestoneStatus::Paying | MilestoneStatus::Paid)
    }

    /// Statuses from which `pay_milestone` may start a payment attempt.
    pub fn is_payable(self) -> bool {
        matches!(self, MilestoneStatus::Completed | MilestoneStatus::Failed)
    }

    /// Work counts as delivered once the milestone has been completed,
    /// whether or not the payment has settled.
    pub fn is_delivered(self) -> bool {
        matches!(
            self,
            MilestoneStatus::Completed | MilestoneStatus::Paying | MilestoneStatus::Paid
        )
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::Paying => "paying",
            MilestoneStatus::Paid => "paid",
            MilestoneStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A priced, schedulable unit of work within a project. It is the atomic
/// object of the payment lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub amount: Amount,
    pub due_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    /// Gateway intent id. Set when the milestone enters `paying`, never
    /// cleared; a retry overwrites it with the fresh intent id.
    pub payment_ref: Option<String>,
}

/// Provider-editable fields for `MilestoneEngine::update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilestoneUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl MilestoneUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.due_date.is_none()
    }
}

/// Field-level patch applied by `MilestoneStore::conditional_update`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilestonePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<MilestoneStatus>,
    pub payment_ref: Option<String>,
}

impl MilestonePatch {
    pub fn status(status: MilestoneStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn status_with_ref(status: MilestoneStatus, payment_ref: String) -> Self {
        Self {
            status: Some(status),
            payment_ref: Some(payment_ref),
            ..Self::default()
        }
    }

    pub fn apply(&self, milestone: &mut Milestone) {
        if let Some(name) = &self.name {
            milestone.name = name.clone();
        }
        if let Some(description) = &self.description {
            milestone.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            milestone.due_date = Some(due_date);
        }
        if let Some(status) = self.status {
            milestone.status = status;
        }
        if let Some(payment_ref) = &self.payment_ref {
            milestone.payment_ref = Some(payment_ref.clone());
        }
    }
}

impl From<MilestoneUpdate> for MilestonePatch {
    fn from(update: MilestoneUpdate) -> Self {
        Self {
            name: update.name,
            description: update.description,
            due_date: update.due_date,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(Amount::new(dec!(0.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_to_cents() {
        assert_eq!(Amount::new(dec!(500)).unwrap().to_cents(), 50_000);
        assert_eq!(Amount::new(dec!(12.34)).unwrap().to_cents(), 1_234);
        assert_eq!(Amount::ZERO.to_cents(), 0);
    }

    #[test]
    fn test_status_edges() {
        use MilestoneStatus::*;
        assert!(Pending.can_transition(Completed));
        assert!(Completed.can_transition(Paying));
        assert!(Paying.can_transition(Paid));
        assert!(Paying.can_transition(Failed));
        assert!(Failed.can_transition(Paying));

        // completed is never skipped, paid is terminal
        assert!(!Pending.can_transition(Paying));
        assert!(!Pending.can_transition(Paid));
        assert!(!Paid.can_transition(Paying));
        assert!(!Paid.can_transition(Completed));
        assert!(!Failed.can_transition(Completed));
    }

    #[test]
    fn test_patch_apply_keeps_untouched_fields() {
        let mut milestone = Milestone {
            id: MilestoneId::new(),
            project_id: ProjectId::from("p1"),
            name: "Demolition".to_string(),
            description: "Tear out the old kitchen".to_string(),
            amount: Amount::new(dec!(500)).unwrap(),
            due_date: None,
            status: MilestoneStatus::Completed,
            payment_ref: None,
        };

        let patch =
            MilestonePatch::status_with_ref(MilestoneStatus::Paying, "pi_123".to_string());
        patch.apply(&mut milestone);

        assert_eq!(milestone.status, MilestoneStatus::Paying);
        assert_eq!(milestone.payment_ref.as_deref(), Some("pi_123"));
        assert_eq!(milestone.name, "Demolition");
        assert_eq!(milestone.amount.value(), dec!(500));
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&MilestoneStatus::Paying).unwrap();
        assert_eq!(json, "\"paying\"");
        let back: MilestoneStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, MilestoneStatus::Failed);
    }
}
