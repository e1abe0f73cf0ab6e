//! `maestro` coordinates discrete-event network simulations: it loads a
//! topology, assigns addresses to simulated hosts, precomputes routing, and
//! drives worker managers through conservatively sized time windows until the
//! simulation terminates.

#![warn(unreachable_pub, missing_docs)]

pub mod core;
