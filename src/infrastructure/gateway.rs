use crate::domain::ports::{IntentStatus, PaymentGateway};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome scripted for the next `create_intent` call on the simulated
/// gateway. `Timeout` leaves the intent pending forever, which the
/// coordinator experiences as an elapsed deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptedOutcome {
    Succeed,
    Fail,
    Timeout,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    script: VecDeque<ScriptedOutcome>,
    intents: HashMap<String, IntentStatus>,
    created: Vec<(String, u64)>,
    refuse_next: bool,
}

/// A scriptable stand-in for the payment processor.
///
/// Unscripted intents succeed. Declines and timeouts can be queued ahead of
/// a `create_intent` call to drive the failure and retry paths. Clones share
/// the intent registry.
#[derive(Default, Clone)]
pub struct SimulatedGateway {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome for the next intent. Outcomes are consumed in
    /// order; an empty queue means success.
    pub async fn script(&self, outcome: ScriptedOutcome) {
        self.inner.lock().await.script.push_back(outcome);
    }

    /// Makes the next `create_intent` call fail outright, before any intent
    /// exists.
    pub async fn refuse_next_intent(&self) {
        self.inner.lock().await.refuse_next = true;
    }

    /// Every intent created so far, as `(intent_id, amount_cents)`.
    pub async fn created_intents(&self) -> Vec<(String, u64)> {
        self.inner.lock().await.created.clone()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_intent(
        &self,
        amount_cents: u64,
        _currency: &str,
        _description: &str,
    ) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if inner.refuse_next {
            inner.refuse_next = false;
            return Err(EngineError::Internal(Box::new(std::io::Error::other(
                "gateway unavailable",
            ))));
        }

        let outcome = inner.script.pop_front().unwrap_or(ScriptedOutcome::Succeed);
        inner.next_id += 1;
        let intent_id = format!("pi_{:06}", inner.next_id);
        let status = match outcome {
            ScriptedOutcome::Succeed => IntentStatus::Succeeded,
            ScriptedOutcome::Fail => IntentStatus::Failed,
            ScriptedOutcome::Timeout => IntentStatus::Pending,
        };
        inner.intents.insert(intent_id.clone(), status);
        inner.created.push((intent_id.clone(), amount_cents));
        Ok(intent_id)
    }

    async fn intent_status(&self, intent_id: &str) -> Result<IntentStatus> {
        let inner = self.inner.lock().await;
        inner.intents.get(intent_id).copied().ok_or_else(|| {
            EngineError::Internal(Box::new(std::io::Error::other(format!(
                "unknown intent {intent_id}"
            ))))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_intents_succeed() {
        let gateway = SimulatedGateway::new();
        let id = gateway.create_intent(1_000, "USD", "test").await.unwrap();
        assert_eq!(
            gateway.intent_status(&id).await.unwrap(),
            IntentStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_scripted_outcomes_consumed_in_order() {
        let gateway = SimulatedGateway::new();
        gateway.script(ScriptedOutcome::Fail).await;
        gateway.script(ScriptedOutcome::Timeout).await;

        let first = gateway.create_intent(100, "USD", "a").await.unwrap();
        let second = gateway.create_intent(200, "USD", "b").await.unwrap();
        let third = gateway.create_intent(300, "USD", "c").await.unwrap();

        assert_eq!(
            gateway.intent_status(&first).await.unwrap(),
            IntentStatus::Failed
        );
        assert_eq!(
            gateway.intent_status(&second).await.unwrap(),
            IntentStatus::Pending
        );
        assert_eq!(
            gateway.intent_status(&third).await.unwrap(),
            IntentStatus::Succeeded
        );

        let created = gateway.created_intents().await;
        assert_eq!(created.len(), 3);
        assert_eq!(created[0].1, 100);
    }

    #[tokio::test]
    async fn test_refuse_next_creates_no_intent() {
        let gateway = SimulatedGateway::new();
        gateway.refuse_next_intent().await;

        assert!(gateway.create_intent(100, "USD", "a").await.is_err());
        assert!(gateway.created_intents().await.is_empty());

        // only the next call was refused
        assert!(gateway.create_intent(100, "USD", "a").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_intent_is_an_error() {
        let gateway = SimulatedGateway::new();
        assert!(gateway.intent_status("pi_999999").await.is_err());
    }
}
