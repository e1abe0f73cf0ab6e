//! Core maestro data structures, traits, and routines. The most common entry
//! point is [`Controller::run`](maestro_core::Controller::run), which takes a
//! parsed configuration through graph loading, host registration, routing
//! computation, and the round loop.

pub use maestro_core::*;
