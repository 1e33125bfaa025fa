//! Engine components that react to break transitions.

pub mod signal;
