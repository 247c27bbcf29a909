//! Strategy judgment engine.
//!
//! A [`Strategy`](vigil_common::types::Strategy) is compiled by
//! [`operator`] into an [`Operator`](operator::Operator) and wrapped in a
//! [`StrategyUnit`](unit::StrategyUnit) holding one sliding window per
//! metric identity. The [`Judger`](judger::Judger) dispatches incoming
//! metrics to units by name, turns Ok/Problem judgments into events and
//! debounces them through the [`Current`](current::Current) table.
//! Composite strategies are scored by [`multi::MultiUnit`].

pub mod calc;
pub mod compare;
pub mod current;
pub mod error;
pub mod judger;
pub mod multi;
pub mod operator;
pub mod unit;
pub mod window;


pub use current::JudgeConfig;
pub use judger::Judger;
