//! The rule evaluation engine.
//!
//! A periodic driver wakes on a fixed cadence and spawns one task per loaded
//! rule. Each task runs the strictly ordered evaluation protocol: acquire
//! the cross-replica lease, check in-process suppression, query the search
//! store, apply the trigger predicate, resolve the level, render the
//! message, pass cross-replica dedup, fan out, persist history, write the
//! alert back into the search store, update suppression, release the lease.
//!
//! Failures inside an evaluation are logged and confined to that rule and
//! tick; nothing propagates to the driver.

pub mod engine;
pub mod levels;
pub mod render;
pub mod trigger;

#[cfg(test)]
mod tests;

pub use engine::{EngineOptions, RuleEngine};
pub use levels::LevelMatcher;
pub use render::render;
pub use trigger::should_trigger;
