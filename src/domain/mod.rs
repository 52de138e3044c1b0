//! Domain layer: milestone entities, project aggregation, and the ports
//! (store and payment gateway) the application layer is wired against.

pub mod milestone;
pub mod ports;
pub mod project;
