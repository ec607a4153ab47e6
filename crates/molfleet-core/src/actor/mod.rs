//! Actor implementations

pub mod fleet;
mod tasks;

pub use fleet::{FleetActor, FleetActorArgs};
