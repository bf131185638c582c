//! Adapters implementing the domain ports without external systems.

pub mod memory;
