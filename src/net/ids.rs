//! Typed handles for the nodes of a net.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::index_vec::Idx;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl Idx for $name {
            fn index(self) -> usize {
                self.0 as usize
            }

            fn from_usize(idx: usize) -> Self {
                debug_assert!(idx <= u32::MAX as usize);
                Self(idx as u32)
            }
        }
    };
}

define_id!(PlaceId, "p#");
define_id!(TransitionId, "t#");

/// Tagged handle used by the name table: a name resolves to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Place(PlaceId),
    Transition(TransitionId),
}

impl NodeId {
    pub fn kind(self) -> NodeKind {
        match self {
            NodeId::Place(_) => NodeKind::Place,
            NodeId::Transition(_) => NodeKind::Transition,
        }
    }

    pub fn as_place(self) -> Option<PlaceId> {
        match self {
            NodeId::Place(place) => Some(place),
            NodeId::Transition(_) => None,
        }
    }

    pub fn as_transition(self) -> Option<TransitionId> {
        match self {
            NodeId::Transition(transition) => Some(transition),
            NodeId::Place(_) => None,
        }
    }
}

impl From<PlaceId> for NodeId {
    fn from(value: PlaceId) -> Self {
        NodeId::Place(value)
    }
}

impl From<TransitionId> for NodeId {
    fn from(value: TransitionId) -> Self {
        NodeId::Transition(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Place,
    Transition,
}

impl NodeKind {
    /// The kind an arc endpoint must have opposite a node of this kind.
    pub fn opposite(self) -> Self {
        match self {
            NodeKind::Place => NodeKind::Transition,
            NodeKind::Transition => NodeKind::Place,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Place => f.write_str("place"),
            NodeKind::Transition => f.write_str("transition"),
        }
    }
}
