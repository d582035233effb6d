//! Application layer orchestrating the payment flows.
//!
//! Each orchestrator drives one transaction type through tokenization, persistence and
//! the card network, talking to the outside world only through the ports in
//! [`crate::domain::ports`]. [`processor::PaymentProcessor`] wires them together behind a
//! request deadline.

pub mod authorization;
pub mod capture;
pub mod dispatch;
pub mod processor;
pub mod refund;
pub mod reversal;
pub mod risk;
pub mod sequence;
