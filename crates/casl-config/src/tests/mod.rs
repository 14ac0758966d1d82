//! Crate-level unit and behavioural tests.

mod unit;
