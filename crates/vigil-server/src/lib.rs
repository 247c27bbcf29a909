//! Process wiring around the judgment engine: configuration, strategy seed
//! files, the composite scan scheduler and the stdin/stdout replay loop.

pub mod config;
pub mod publisher;
pub mod replay;
pub mod scheduler;
pub mod strategy_loader;
