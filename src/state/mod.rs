//! # Observed and expected component state.
//!
//! [`ComponentState`] is the authoritative record the supervisor keeps about
//! the managed service: a component-level [`UnitState`] with a human-readable
//! message, the state the service has been asked to reach, and per-unit
//! observed/expected maps. The supervisor loop is its only mutator; everyone
//! else receives clones through the watch channel.

mod component_state;
mod unit_state;

pub use component_state::{ComponentState, ExpectedUnitState, ObservedUnitState};
pub use unit_state::UnitState;
