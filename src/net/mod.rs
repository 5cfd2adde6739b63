//! # Place/Transition nets
//!
//! Let `P` be the set of places and `T` the set of transitions. Input and
//! output arcs are kept as matrices `Pre, Post ∈ ℕ^{|P|×|T|}` and the effect of
//! firing is `C = Post - Pre`. For a marking `M ∈ ℕ^{|P|}`:
//!
//! * `t` is **enabled** iff it has at least one input arc and
//!   `∀p ∈ P: M[p] ≥ Pre[p, t]`; with [`CapacityPolicy::Gate`](crate::CapacityPolicy)
//!   also `M[p] + C[p, t] ≤ cap(p)` for every bounded place;
//! * **firing** an enabled `t` yields `M' = M + C[:, t]`, atomically.
//!
//! The net never picks a transition by itself; callers query and fire.
//!
//! ## Example
//!
//! ```rust
//! use ptnet::net::*;
//!
//! let mut net = Net::new();
//! let p0 = net.place("p0", 1).unwrap();
//! let p1 = net.place_with_capacity("p1", 0, 1).unwrap();
//! let t0 = net.transition("t0").unwrap();
//!
//! net.connect(p0, t0).unwrap();
//! net.connect(t0, p1).unwrap();
//!
//! assert_eq!(net.enabled_transitions(), vec![t0]);
//! net.fire("t0").unwrap();
//! assert_eq!(net.tokens(p0), Ok(0));
//! assert_eq!(net.tokens("p1"), Ok(1));
//! assert_eq!(net.can_fire(t0), Ok(false));
//! ```

pub mod core;
pub mod error;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod io;
pub mod structure;

pub use self::core::{ArcBuilder, DiagnosticReport, Net, NodeKey};
pub use error::{ArcDefect, NetError, SequenceError};
pub use ids::{NodeId, NodeKind, PlaceId, TransitionId};
pub use incidence::{Incidence, MatrixNet};
pub use index_vec::{Idx, IndexVec};
pub use structure::{Arc, ArcDirection, Marking, Place, Transition, Weight};
