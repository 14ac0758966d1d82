//! Crate-level behavioural tests and shared test support.

mod behaviour;
pub(crate) mod support;
