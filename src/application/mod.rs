//! Application layer: orchestration over the domain ports.
//!
//! `MilestoneEngine` owns the milestone state machine; `PaymentCoordinator`
//! runs the pay-milestone saga against the payment gateway. Both are
//! stateless between calls; all durable state lives behind the
//! `MilestoneStore` port.

pub mod coordinator;
pub mod engine;
