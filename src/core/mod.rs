pub mod archive;
pub mod cadence;
pub mod classifier;
pub mod config;
pub mod context;
pub mod conversation;
pub mod dream;
pub mod echo;
pub mod grammar;
pub mod intent;
pub mod journal;
pub mod persona;
pub mod pipeline;
pub mod responder;
pub mod store;
pub mod text;
pub mod triggers;
pub mod trust;
pub mod variety;
