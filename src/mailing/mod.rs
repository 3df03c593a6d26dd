//! Mailings: who receives them, how they run, and what gets recorded along the way.

pub mod journal;
pub mod runner;
pub mod strategy;
pub mod types;
