//! Domain tests module.
//!
//! - Property tests: proptest-driven invariants over steps and replay
//! - Replay tests: delta log consistency with the materialized state
