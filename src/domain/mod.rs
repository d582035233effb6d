//! Entities, value objects and the pure policies that govern them.
//!
//! Nothing in here performs I/O; the `ports` module names the collaborators that do.

pub mod authorization;
pub mod capture;
pub mod card;
pub mod money;
pub mod ports;
pub mod refund;
pub mod reversal;
pub mod scheme;
pub mod sequence;
