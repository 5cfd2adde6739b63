//! Static elements of a P/T net: places, transitions, arcs and markings.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::error::NetError;
use crate::net::ids::{NodeId, PlaceId, TransitionId};

pub type Weight = u64;

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
pub struct Place {
    name: String,
    tokens: Weight,
    capacity: Option<Weight>,
}

impl Place {
    pub(crate) fn new(
        name: impl Into<String>,
        tokens: Weight,
        capacity: Option<Weight>,
    ) -> Result<Self, NetError> {
        let name = name.into();
        if let Some(capacity) = capacity
            && tokens > capacity
        {
            return Err(NetError::CapacityExceeded {
                place: name,
                after: tokens,
                capacity,
            });
        }
        Ok(Self {
            name,
            tokens,
            capacity,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tokens(&self) -> Weight {
        self.tokens
    }

    pub fn capacity(&self) -> Option<Weight> {
        self.capacity
    }

    pub fn has_enough_tokens(&self, n: Weight) -> bool {
        self.tokens >= n
    }

    /// True when a capacity is set and adding `n` tokens would exceed it.
    pub fn max_tokens_reached(&self, n: Weight) -> bool {
        match self.capacity {
            Some(capacity) => self.tokens.saturating_add(n) > capacity,
            None => false,
        }
    }

    /// Overwrites the marking of this place.
    ///
    /// The count is signed so that externally supplied values are validated
    /// instead of wrapped.
    pub fn set_tokens(&mut self, n: i64) -> Result<(), NetError> {
        let tokens = Weight::try_from(n).map_err(|_| NetError::NegativeMarking {
            place: self.name.clone(),
            requested: n,
        })?;
        self.check_capacity(tokens)?;
        self.tokens = tokens;
        Ok(())
    }

    pub(crate) fn add_tokens(&mut self, n: Weight) -> Result<(), NetError> {
        let after = self.tokens.checked_add(n).ok_or_else(|| self.overflow(n))?;
        self.check_capacity(after)?;
        self.tokens = after;
        Ok(())
    }

    pub(crate) fn remove_tokens(&mut self, n: Weight) -> Result<(), NetError> {
        self.tokens = self
            .tokens
            .checked_sub(n)
            .ok_or_else(|| NetError::InsufficientTokens {
                place: self.name.clone(),
                available: self.tokens,
                requested: n,
            })?;
        Ok(())
    }

    /// Shifts the marking by `delta`; nothing changes on error.
    pub(crate) fn adjust_tokens(&mut self, delta: i64) -> Result<Weight, NetError> {
        let change = delta.unsigned_abs();
        let after = if delta < 0 {
            // On underflow `tokens < |delta|`, so the signed sum is exact.
            self.tokens
                .checked_sub(change)
                .ok_or_else(|| NetError::NegativeMarking {
                    place: self.name.clone(),
                    requested: delta.saturating_add_unsigned(self.tokens),
                })?
        } else {
            self.tokens
                .checked_add(change)
                .ok_or_else(|| self.overflow(change))?
        };
        self.check_capacity(after)?;
        self.tokens = after;
        Ok(after)
    }

    fn overflow(&self, added: Weight) -> NetError {
        NetError::TokenOverflow {
            place: self.name.clone(),
            tokens: self.tokens,
            added,
        }
    }

    /// Writes a count that the caller has already checked against capacity.
    pub(crate) fn put_tokens(&mut self, tokens: Weight) {
        debug_assert!(self.check_capacity(tokens).is_ok());
        self.tokens = tokens;
    }

    pub(crate) fn check_capacity(&self, after: Weight) -> Result<(), NetError> {
        match self.capacity {
            Some(capacity) if after > capacity => Err(NetError::CapacityExceeded {
                place: self.name.clone(),
                after,
                capacity,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Transition {
    name: String,
}

impl Transition {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
}

/// A weighted edge between a place and a transition.
///
/// Arcs are values read out of the net; their weight is changed through
/// [`Net::set_weight`](crate::net::Net::set_weight).
#[derive(Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Arc {
    pub place: PlaceId,
    pub transition: TransitionId,
    pub weight: Weight,
    pub direction: ArcDirection,
}

impl Arc {
    pub fn new(
        place: PlaceId,
        transition: TransitionId,
        weight: Weight,
        direction: ArcDirection,
    ) -> Self {
        Self {
            place,
            transition,
            weight,
            direction,
        }
    }

    pub fn source(&self) -> NodeId {
        match self.direction {
            ArcDirection::PlaceToTransition => NodeId::Place(self.place),
            ArcDirection::TransitionToPlace => NodeId::Transition(self.transition),
        }
    }

    pub fn target(&self) -> NodeId {
        match self.direction {
            ArcDirection::PlaceToTransition => NodeId::Transition(self.transition),
            ArcDirection::TransitionToPlace => NodeId::Place(self.place),
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == ArcDirection::PlaceToTransition
    }

    pub fn is_output(&self) -> bool {
        self.direction == ArcDirection::TransitionToPlace
    }
}

impl fmt::Debug for Arc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            ArcDirection::PlaceToTransition => "->",
            ArcDirection::TransitionToPlace => "<-",
        };
        write!(
            f,
            "Arc({:?} {} {:?}, w={})",
            self.place, arrow, self.transition, self.weight
        )
    }
}

/// Snapshot of the token count of every place, keyed by place name in
/// declaration order.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Marking(IndexMap<String, Weight>);

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tokens(&self, place: &str) -> Option<Weight> {
        self.0.get(place).copied()
    }

    pub fn set(&mut self, place: impl Into<String>, tokens: Weight) -> Option<Weight> {
        self.0.insert(place.into(), tokens)
    }

    /// Sum over all places. Widened so that any marking of `u64` counts fits.
    pub fn total(&self) -> u128 {
        self.0.values().map(|tokens| u128::from(*tokens)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Weight)> {
        self.0.iter().map(|(name, tokens)| (name.as_str(), *tokens))
    }
}

impl FromIterator<(String, Weight)> for Marking {
    fn from_iter<I: IntoIterator<Item = (String, Weight)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
