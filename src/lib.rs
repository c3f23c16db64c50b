//! Narrator Engine — a stateful synthetic-narrator dialogue engine.
//!
//! Classifies the emotional content of free-text input, evolves a
//! long-lived trust/phase state machine, keeps memories of past turns,
//! and answers with template-driven text that is deliberately fragmented
//! and corrupted as the relationship destabilizes. Rule and keyword based
//! throughout, with seeded randomness and no model inference.

pub mod core;
pub mod schema;
