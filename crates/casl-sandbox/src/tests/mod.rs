//! Crate-level unit and behavioural tests.

mod behaviour;
mod support;
