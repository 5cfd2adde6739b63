//! Place/Transition Petri net engine.
//!
//! A [`net::Net`] owns places, transitions and weighted arcs. Callers build the
//! graph, then query [`net::Net::can_fire`] and drive [`net::Net::fire`]; the net
//! never schedules firings on its own.

pub mod config;
pub mod net;

pub use config::{CapacityPolicy, EngineConfig};
pub use net::{Net, NetError};
