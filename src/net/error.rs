use std::fmt;

use thiserror::Error;

use crate::net::ids::NodeKind;
use crate::net::structure::Weight;

/// Why a requested arc cannot be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArcDefect {
    /// Both endpoints are places, or both are transitions.
    SameKind(NodeKind),
    /// The named endpoint does not exist in this net.
    MissingEndpoint(String),
    /// The ordered pair is already connected.
    AlreadyConnected,
    /// The name is declared, but as the other kind of node.
    KindMismatch { name: String, expected: NodeKind },
}

impl fmt::Display for ArcDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArcDefect::SameKind(kind) => write!(f, "both endpoints are a {kind}"),
            ArcDefect::MissingEndpoint(name) => write!(f, "endpoint `{name}` does not exist"),
            ArcDefect::AlreadyConnected => f.write_str("the ordered pair is already connected"),
            ArcDefect::KindMismatch { name, expected } => {
                write!(f, "`{name}` is not a {expected}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("name `{0}` is already used by a place or transition")]
    DuplicateName(String),
    #[error("invalid arc `{from}` -> `{to}`: {reason}")]
    InvalidArc {
        from: String,
        to: String,
        reason: ArcDefect,
    },
    #[error("arc weight must be positive, got {0}")]
    InvalidWeight(i64),
    #[error("arc weight {0} does not fit a signed 64-bit weight")]
    WeightOutOfRange(Weight),
    #[error("place `{place}` cannot hold a negative marking ({requested})")]
    NegativeMarking { place: String, requested: i64 },
    #[error("place `{place}` holds {available} tokens, {requested} requested")]
    InsufficientTokens {
        place: String,
        available: Weight,
        requested: Weight,
    },
    #[error("capacity exceeded at place `{place}`: {after} > {capacity}")]
    CapacityExceeded {
        place: String,
        after: Weight,
        capacity: Weight,
    },
    #[error("place `{place}` holds {tokens} tokens and cannot take {added} more")]
    TokenOverflow {
        place: String,
        tokens: Weight,
        added: Weight,
    },
    #[error("transition `{0}` is not enabled under the current marking")]
    TransitionNotEnabled(String),
    #[error("no place named `{0}`")]
    UnknownPlace(String),
    #[error("no transition named `{0}`")]
    UnknownTransition(String),
    #[error("no arc `{from}` -> `{to}`")]
    UnknownArc { from: String, to: String },
    #[error("incidence matrix has {rows} rows but the marking has {places} entries")]
    MatrixShape { rows: usize, places: usize },
    #[error("incidence matrix row {row} has {columns} columns, expected {expected}")]
    RaggedMatrix {
        row: usize,
        columns: usize,
        expected: usize,
    },
    #[error("place `{place}` holds {tokens} tokens, too many for a signed marking vector")]
    MarkingOutOfRange { place: String, tokens: Weight },
    #[error("transition column {column} is out of bounds ({columns} columns)")]
    UnknownColumn { column: usize, columns: usize },
    #[error("firing column {0} would produce a negative marking")]
    InvalidMarking(usize),
}

/// Failure part-way through [`Net::fire_sequence`](crate::net::Net::fire_sequence).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step {step} of the firing sequence failed: {source}")]
pub struct SequenceError {
    /// Number of transitions that fired before the failing one.
    pub step: usize,
    pub source: NetError,
}
