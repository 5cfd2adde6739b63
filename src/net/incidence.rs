//! Place × transition weight matrices and the bare matrix encoding of a net.
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::net::error::NetError;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::structure::Weight;

type SmallRow<T> = SmallVec<[T; 4]>;

/// One row per place, one column per transition.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incidence<T> {
    rows: IndexVec<PlaceId, SmallRow<T>>,
    cols: usize,
}

impl<T: Clone> Incidence<T> {
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(default.clone(), transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn push_place_with_default(&mut self, default: T) -> PlaceId {
        self.rows.push(SmallRow::from_elem(default, self.cols))
    }

    pub fn push_transition_with_default(&mut self, default: T) -> TransitionId {
        let next = self.cols;
        for row in self.rows.iter_mut() {
            row.push(default.clone());
        }
        self.cols += 1;
        TransitionId::from_usize(next)
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, place: PlaceId, transition: TransitionId, value: T) {
        self.rows[place][transition.index()] = value;
    }

    pub fn get(&self, place: PlaceId, transition: TransitionId) -> &T {
        &self.rows[place][transition.index()]
    }

    /// Entries of one transition's column, top to bottom.
    pub fn column(&self, transition: TransitionId) -> impl Iterator<Item = (PlaceId, &T)> {
        self.rows
            .iter_enumerated()
            .map(move |(place, row)| (place, &row[transition.index()]))
    }

    pub fn rows(&self) -> &IndexVec<PlaceId, SmallRow<T>> {
        &self.rows
    }
}

impl<T: fmt::Debug> fmt::Debug for Incidence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incidence")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl Incidence<Weight> {
    /// `self - other`, entry by entry. Used as `C = Post - Pre`.
    pub fn difference(&self, other: &Self) -> Incidence<i64> {
        assert_eq!(self.places(), other.places());
        assert_eq!(self.transitions(), other.transitions());
        let rows = self
            .rows
            .iter()
            .zip(other.rows.iter())
            .map(|(left, right)| {
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| *l as i64 - *r as i64)
                    .collect::<SmallRow<_>>()
            })
            .collect();
        Incidence {
            rows,
            cols: self.cols,
        }
    }
}

/// A net given only as an incidence matrix and a marking vector.
///
/// Firing column `t` adds that column to the marking and is refused if any
/// entry would turn negative. There are no names, capacities or separate
/// pre/post sets, so self-loops are invisible to this encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixNet {
    incidence: Vec<Vec<i64>>,
    marking: Vec<i64>,
}

impl MatrixNet {
    pub fn new(incidence: Vec<Vec<i64>>, marking: Vec<i64>) -> Result<Self, NetError> {
        if incidence.len() != marking.len() {
            return Err(NetError::MatrixShape {
                rows: incidence.len(),
                places: marking.len(),
            });
        }
        if let Some(expected) = incidence.first().map(Vec::len)
            && let Some(row) = incidence.iter().position(|row| row.len() != expected)
        {
            return Err(NetError::RaggedMatrix {
                row,
                columns: incidence[row].len(),
                expected,
            });
        }
        if let Some(place) = marking.iter().position(|tokens| *tokens < 0) {
            return Err(NetError::NegativeMarking {
                place: format!("#{place}"),
                requested: marking[place],
            });
        }
        Ok(Self { incidence, marking })
    }

    pub fn columns(&self) -> usize {
        self.incidence.first().map_or(0, Vec::len)
    }

    pub fn marking(&self) -> &[i64] {
        &self.marking
    }

    pub fn incidence(&self) -> &[Vec<i64>] {
        &self.incidence
    }

    pub fn is_enabled(&self, column: usize) -> bool {
        column < self.columns() && self.successor(column).is_some()
    }

    pub fn fire_transition(&mut self, column: usize) -> Result<(), NetError> {
        let columns = self.columns();
        if column >= columns {
            return Err(NetError::UnknownColumn { column, columns });
        }
        let next = self
            .successor(column)
            .ok_or(NetError::InvalidMarking(column))?;
        log::debug!("matrix net fired column {column}: {:?} -> {next:?}", self.marking);
        self.marking = next;
        Ok(())
    }

    fn successor(&self, column: usize) -> Option<Vec<i64>> {
        self.marking
            .iter()
            .zip(&self.incidence)
            .map(|(tokens, row)| {
                let after = tokens.checked_add(row[column])?;
                (after >= 0).then_some(after)
            })
            .collect()
    }
}

impl fmt::Display for MatrixNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Incidence Matrix:")?;
        for row in &self.incidence {
            writeln!(f, "{row:?}")?;
        }
        writeln!(f, "Marking: {:?}", self.marking)
    }
}
