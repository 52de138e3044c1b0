//! Adapters behind the domain ports: milestone stores and the simulated
//! payment gateway.

pub mod gateway;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
