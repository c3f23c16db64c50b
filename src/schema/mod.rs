pub mod emotion;
pub mod event;
pub mod intent;
pub mod memory;
pub mod narrative;
pub mod trust;
