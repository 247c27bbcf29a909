//! Data model shared between the judgment engine and its collaborators:
//! metric samples, strategies, and the events produced from them.

pub mod types;
