//! Net registry, graph construction and the firing rule.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::config::{CapacityPolicy, EngineConfig};
use crate::net::error::{ArcDefect, NetError, SequenceError};
use crate::net::ids::{NodeId, NodeKind, PlaceId, TransitionId};
use crate::net::incidence::{Incidence, MatrixNet};
use crate::net::index_vec::IndexVec;
use crate::net::structure::{Arc, ArcDirection, Marking, Place, Transition, Weight};

/// Names a node of a net, either by its name or by a typed handle.
pub trait NodeKey {
    fn resolve(&self, net: &Net) -> Option<NodeId>;

    /// Human readable form used in error messages.
    fn label(&self, net: &Net) -> String;
}

impl NodeKey for str {
    fn resolve(&self, net: &Net) -> Option<NodeId> {
        net.names.get(self).copied()
    }

    fn label(&self, _net: &Net) -> String {
        self.to_owned()
    }
}

impl NodeKey for String {
    fn resolve(&self, net: &Net) -> Option<NodeId> {
        self.as_str().resolve(net)
    }

    fn label(&self, net: &Net) -> String {
        self.as_str().label(net)
    }
}

impl NodeKey for NodeId {
    fn resolve(&self, net: &Net) -> Option<NodeId> {
        match self {
            NodeId::Place(place) => place.resolve(net),
            NodeId::Transition(transition) => transition.resolve(net),
        }
    }

    fn label(&self, net: &Net) -> String {
        match self {
            NodeId::Place(place) => place.label(net),
            NodeId::Transition(transition) => transition.label(net),
        }
    }
}

impl NodeKey for PlaceId {
    fn resolve(&self, net: &Net) -> Option<NodeId> {
        net.places.contains(*self).then_some(NodeId::Place(*self))
    }

    fn label(&self, net: &Net) -> String {
        net.places
            .get(*self)
            .map_or_else(|| format!("{self:?}"), |place| place.name().to_owned())
    }
}

impl NodeKey for TransitionId {
    fn resolve(&self, net: &Net) -> Option<NodeId> {
        net.transitions
            .contains(*self)
            .then_some(NodeId::Transition(*self))
    }

    fn label(&self, net: &Net) -> String {
        net.transitions.get(*self).map_or_else(
            || format!("{self:?}"),
            |transition| transition.name().to_owned(),
        )
    }
}

impl<K: NodeKey + ?Sized> NodeKey for &K {
    fn resolve(&self, net: &Net) -> Option<NodeId> {
        (**self).resolve(net)
    }

    fn label(&self, net: &Net) -> String {
        (**self).label(net)
    }
}

/// Structural problems found by [`Net::diagnose_connectivity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticReport {
    /// Places without any arc.
    pub isolated_places: Vec<(PlaceId, String)>,
    /// Transitions without any arc.
    pub isolated_transitions: Vec<(TransitionId, String)>,
    pub warnings: Vec<String>,
    pub total_places: usize,
    pub total_transitions: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} places, {} transitions",
            self.total_places, self.total_transitions
        )?;
        if !self.isolated_places.is_empty() {
            writeln!(f, "isolated places ({}):", self.isolated_places.len())?;
            for (id, name) in &self.isolated_places {
                writeln!(f, "  {id:?} {name}")?;
            }
        }
        if !self.isolated_transitions.is_empty() {
            writeln!(
                f,
                "isolated transitions ({}):",
                self.isolated_transitions.len()
            )?;
            for (id, name) in &self.isolated_transitions {
                writeln!(f, "  {id:?} {name}")?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "warnings ({}):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
        }
        Ok(())
    }
}

/// A Place/Transition net.
///
/// Arc weights live in two place × transition matrices: `pre` holds input arcs
/// (place → transition) and `post` output arcs (transition → place). A zero
/// entry means "no arc", which is why weights are always positive.
#[derive(Clone)]
pub struct Net {
    config: EngineConfig,
    places: IndexVec<PlaceId, Place>,
    transitions: IndexVec<TransitionId, Transition>,
    names: IndexMap<String, NodeId>,
    pre: Incidence<Weight>,
    post: Incidence<Weight>,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::new()
    }
}

impl Net {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            places: IndexVec::new(),
            transitions: IndexVec::new(),
            names: IndexMap::new(),
            pre: Incidence::new(0, 0, 0),
            post: Incidence::new(0, 0, 0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn place(&mut self, name: impl Into<String>, tokens: Weight) -> Result<PlaceId, NetError> {
        self.add_place(name.into(), tokens, None)
    }

    pub fn place_with_capacity(
        &mut self,
        name: impl Into<String>,
        tokens: Weight,
        capacity: Weight,
    ) -> Result<PlaceId, NetError> {
        self.add_place(name.into(), tokens, Some(capacity))
    }

    fn add_place(
        &mut self,
        name: String,
        tokens: Weight,
        capacity: Option<Weight>,
    ) -> Result<PlaceId, NetError> {
        self.check_unused(&name)?;
        let place = Place::new(name.clone(), tokens, capacity)?;
        let place_id = self.places.push(place);
        self.pre.push_place_with_default(0);
        self.post.push_place_with_default(0);
        self.names.insert(name, NodeId::Place(place_id));
        Ok(place_id)
    }

    pub fn transition(&mut self, name: impl Into<String>) -> Result<TransitionId, NetError> {
        let name = name.into();
        self.check_unused(&name)?;
        let transition_id = self.transitions.push(Transition::new(name.clone()));
        self.pre.push_transition_with_default(0);
        self.post.push_transition_with_default(0);
        self.names.insert(name, NodeId::Transition(transition_id));
        Ok(transition_id)
    }

    fn check_unused(&self, name: &str) -> Result<(), NetError> {
        if self.names.contains_key(name) {
            return Err(NetError::DuplicateName(name.to_owned()));
        }
        Ok(())
    }

    /// Adds an arc of weight 1. See [`Net::connect_weighted`].
    pub fn connect<S: NodeKey, T: NodeKey>(&mut self, source: S, target: T) -> Result<Arc, NetError> {
        self.connect_weighted(source, target, 1)
    }

    /// Adds an arc between two declared nodes of opposite kinds.
    ///
    /// At most one arc may exist per ordered pair; `p -> t` and `t -> p` are
    /// different pairs and together form a self-loop.
    pub fn connect_weighted<S: NodeKey, T: NodeKey>(
        &mut self,
        source: S,
        target: T,
        weight: i64,
    ) -> Result<Arc, NetError> {
        let weight = positive_weight(weight)?;
        let (from, to) = match (source.resolve(self), target.resolve(self)) {
            (Some(from), Some(to)) => (from, to),
            (None, _) => {
                let missing = source.label(self);
                return Err(self.arc_error(&source, &target, ArcDefect::MissingEndpoint(missing)));
            }
            (_, None) => {
                let missing = target.label(self);
                return Err(self.arc_error(&source, &target, ArcDefect::MissingEndpoint(missing)));
            }
        };
        let Some((place, transition, direction)) = orient(from, to) else {
            return Err(self.arc_error(&source, &target, ArcDefect::SameKind(from.kind())));
        };
        if *self.matrix(direction).get(place, transition) != 0 {
            return Err(self.arc_error(&source, &target, ArcDefect::AlreadyConnected));
        }
        self.matrix_mut(direction).set(place, transition, weight);
        log::debug!(
            "connected `{}` -> `{}` with weight {}",
            source.label(self),
            target.label(self),
            weight
        );
        Ok(Arc::new(place, transition, weight, direction))
    }

    /// Starts a two-step connect from a place: `net.connect_place("p").to("t")`.
    pub fn connect_place(&mut self, name: impl Into<String>) -> ArcBuilder<'_> {
        ArcBuilder::new(self, name.into(), NodeKind::Place)
    }

    /// Starts a two-step connect from a transition: `net.connect_transition("t").to("p")`.
    pub fn connect_transition(&mut self, name: impl Into<String>) -> ArcBuilder<'_> {
        ArcBuilder::new(self, name.into(), NodeKind::Transition)
    }

    pub fn set_weight<S: NodeKey, T: NodeKey>(
        &mut self,
        source: S,
        target: T,
        weight: i64,
    ) -> Result<(), NetError> {
        let weight = positive_weight(weight)?;
        let arc = self
            .arc(&source, &target)
            .ok_or_else(|| NetError::UnknownArc {
                from: source.label(self),
                to: target.label(self),
            })?;
        self.matrix_mut(arc.direction)
            .set(arc.place, arc.transition, weight);
        Ok(())
    }

    fn arc_error<S: NodeKey, T: NodeKey>(&self, source: &S, target: &T, reason: ArcDefect) -> NetError {
        NetError::InvalidArc {
            from: source.label(self),
            to: target.label(self),
            reason,
        }
    }

    fn matrix(&self, direction: ArcDirection) -> &Incidence<Weight> {
        match direction {
            ArcDirection::PlaceToTransition => &self.pre,
            ArcDirection::TransitionToPlace => &self.post,
        }
    }

    fn matrix_mut(&mut self, direction: ArcDirection) -> &mut Incidence<Weight> {
        match direction {
            ArcDirection::PlaceToTransition => &mut self.pre,
            ArcDirection::TransitionToPlace => &mut self.post,
        }
    }

    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn place_id(&self, name: &str) -> Option<PlaceId> {
        self.node(name).and_then(NodeId::as_place)
    }

    pub fn transition_id(&self, name: &str) -> Option<TransitionId> {
        self.node(name).and_then(NodeId::as_transition)
    }

    pub fn node_name(&self, node: NodeId) -> Option<&str> {
        match node {
            NodeId::Place(place) => self.places.get(place).map(Place::name),
            NodeId::Transition(transition) => {
                self.transitions.get(transition).map(Transition::name)
            }
        }
    }

    pub fn get_place(&self, place: PlaceId) -> Option<&Place> {
        self.places.get(place)
    }

    pub fn get_transition(&self, transition: TransitionId) -> Option<&Transition> {
        self.transitions.get(transition)
    }

    pub fn find_place(&self, name: &str) -> Option<&Place> {
        self.place_id(name).map(|place| &self.places[place])
    }

    pub fn find_transition(&self, name: &str) -> Option<&Transition> {
        self.transition_id(name)
            .map(|transition| &self.transitions[transition])
    }

    /// Places in declaration order.
    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter_enumerated()
    }

    /// Transitions in declaration order.
    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter_enumerated()
    }

    /// Every arc, grouped by transition: its inputs, then its outputs.
    pub fn arcs(&self) -> impl Iterator<Item = Arc> + '_ {
        self.transitions
            .indices()
            .flat_map(move |transition| {
                self.input_arcs(transition)
                    .chain(self.output_arcs(transition))
            })
    }

    pub fn arc<S: NodeKey, T: NodeKey>(&self, source: S, target: T) -> Option<Arc> {
        let (place, transition, direction) = orient(source.resolve(self)?, target.resolve(self)?)?;
        let weight = *self.matrix(direction).get(place, transition);
        (weight > 0).then(|| Arc::new(place, transition, weight, direction))
    }

    pub fn input_arcs(&self, transition: TransitionId) -> impl Iterator<Item = Arc> + '_ {
        self.arcs_of(transition, ArcDirection::PlaceToTransition)
    }

    pub fn output_arcs(&self, transition: TransitionId) -> impl Iterator<Item = Arc> + '_ {
        self.arcs_of(transition, ArcDirection::TransitionToPlace)
    }

    fn arcs_of(
        &self,
        transition: TransitionId,
        direction: ArcDirection,
    ) -> impl Iterator<Item = Arc> + '_ {
        self.transitions
            .contains(transition)
            .then(|| self.matrix(direction).column(transition))
            .into_iter()
            .flatten()
            .filter(|(_, weight)| **weight > 0)
            .map(move |(place, weight)| Arc::new(place, transition, *weight, direction))
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn arcs_len(&self) -> usize {
        let count = |matrix: &Incidence<Weight>| {
            matrix
                .rows()
                .iter()
                .map(|row| row.iter().filter(|weight| **weight > 0).count())
                .sum::<usize>()
        };
        count(&self.pre) + count(&self.post)
    }

    fn resolve_place<K: NodeKey + ?Sized>(&self, key: &K) -> Result<PlaceId, NetError> {
        key.resolve(self)
            .and_then(NodeId::as_place)
            .ok_or_else(|| NetError::UnknownPlace(key.label(self)))
    }

    fn resolve_transition<K: NodeKey + ?Sized>(&self, key: &K) -> Result<TransitionId, NetError> {
        key.resolve(self)
            .and_then(NodeId::as_transition)
            .ok_or_else(|| NetError::UnknownTransition(key.label(self)))
    }

    pub fn tokens<K: NodeKey>(&self, place: K) -> Result<Weight, NetError> {
        let place = self.resolve_place(&place)?;
        Ok(self.places[place].tokens())
    }

    /// Overwrites a place's marking, e.g. to seed the initial state.
    pub fn set_tokens<K: NodeKey>(&mut self, place: K, tokens: i64) -> Result<(), NetError> {
        let place = self.resolve_place(&place)?;
        self.places[place].set_tokens(tokens)
    }

    /// Shifts a place's marking by `delta` and returns the new count.
    pub fn adjust_tokens<K: NodeKey>(&mut self, place: K, delta: i64) -> Result<Weight, NetError> {
        let place = self.resolve_place(&place)?;
        self.places[place].adjust_tokens(delta)
    }

    pub fn marking(&self) -> Marking {
        self.places
            .iter()
            .map(|place| (place.name().to_owned(), place.tokens()))
            .collect()
    }

    /// Writes a snapshot back. Every entry is checked before any place is
    /// touched; places missing from the snapshot keep their tokens.
    pub fn restore(&mut self, marking: &Marking) -> Result<(), NetError> {
        let mut staged = Vec::with_capacity(marking.len());
        for (name, tokens) in marking.iter() {
            let place = self.resolve_place(name)?;
            self.places[place].check_capacity(tokens)?;
            staged.push((place, tokens));
        }
        for (place, tokens) in staged {
            self.places[place].put_tokens(tokens);
        }
        log::debug!("restored marking {:?}", marking);
        Ok(())
    }

    pub fn can_fire<K: NodeKey>(&self, transition: K) -> Result<bool, NetError> {
        let transition = self.resolve_transition(&transition)?;
        Ok(self.is_enabled(transition))
    }

    /// The guard of `transition` under the current marking.
    ///
    /// A transition without input arcs is never enabled, nor is one whose
    /// firing would push a place past `Weight::MAX`. Under
    /// [`CapacityPolicy::Gate`] the net effect on every output place must also
    /// stay within its capacity.
    pub fn is_enabled(&self, transition: TransitionId) -> bool {
        if !self.transitions.contains(transition) {
            return false;
        }
        let gate_capacity = self.config.capacity_policy == CapacityPolicy::Gate;
        let mut has_input = false;
        for ((place_id, &consumed), (_, &produced)) in self
            .pre
            .column(transition)
            .zip(self.post.column(transition))
        {
            let place = &self.places[place_id];
            if consumed > 0 {
                has_input = true;
                if !place.has_enough_tokens(consumed) {
                    log::trace!(
                        "`{}` disabled: `{}` holds {} < {}",
                        self.transitions[transition].name(),
                        place.name(),
                        place.tokens(),
                        consumed
                    );
                    return false;
                }
            }
            if produced <= consumed {
                continue;
            }
            let gain = produced - consumed;
            if place.tokens().checked_add(gain).is_none() {
                log::trace!(
                    "`{}` disabled: `{}` would overflow its token counter",
                    self.transitions[transition].name(),
                    place.name()
                );
                return false;
            }
            if gate_capacity && place.max_tokens_reached(gain) {
                log::trace!(
                    "`{}` disabled: `{}` would exceed its capacity",
                    self.transitions[transition].name(),
                    place.name()
                );
                return false;
            }
        }
        has_input
    }

    /// Transitions enabled under the current marking, in declaration order.
    pub fn enabled_transitions(&self) -> Vec<TransitionId> {
        self.transitions
            .indices()
            .filter(|transition| self.is_enabled(*transition))
            .collect()
    }

    /// Fires `transition`: consumes along its input arcs and produces along
    /// its output arcs. Either the whole firing happens or nothing changes.
    pub fn fire<K: NodeKey>(&mut self, transition: K) -> Result<(), NetError> {
        let transition = self.resolve_transition(&transition)?;
        if !self.is_enabled(transition) {
            return Err(NetError::TransitionNotEnabled(
                self.transitions[transition].name().to_owned(),
            ));
        }

        let mut staged: SmallVec<[(PlaceId, Place); 8]> = SmallVec::new();
        let (mut consumed_total, mut produced_total): (Weight, Weight) = (0, 0);
        for ((place_id, &consumed), (_, &produced)) in self
            .pre
            .column(transition)
            .zip(self.post.column(transition))
        {
            if consumed == 0 && produced == 0 {
                continue;
            }
            let mut scratch = self.places[place_id].clone();
            scratch.remove_tokens(consumed)?;
            scratch.add_tokens(produced)?;
            staged.push((place_id, scratch));
            consumed_total = consumed_total.saturating_add(consumed);
            produced_total = produced_total.saturating_add(produced);
        }

        for (place_id, place) in staged {
            self.places[place_id] = place;
        }
        log::debug!(
            "fired `{}`: consumed {}, produced {}",
            self.transitions[transition].name(),
            consumed_total,
            produced_total
        );
        Ok(())
    }

    /// Fires transitions in order and returns how many fired. Stops at the
    /// first failure; the transitions fired before it stay fired.
    pub fn fire_sequence<I>(&mut self, sequence: I) -> Result<usize, SequenceError>
    where
        I: IntoIterator,
        I::Item: NodeKey,
    {
        let mut fired = 0;
        for transition in sequence {
            self.fire(transition)
                .map_err(|source| SequenceError { step: fired, source })?;
            fired += 1;
        }
        Ok(fired)
    }

    pub fn incidence(&self) -> (&Incidence<Weight>, &Incidence<Weight>) {
        (&self.pre, &self.post)
    }

    /// `C = Post - Pre`.
    pub fn c_matrix(&self) -> Incidence<i64> {
        self.post.difference(&self.pre)
    }

    /// Projects this net onto the bare incidence-matrix encoding.
    pub fn to_matrix_net(&self) -> Result<MatrixNet, NetError> {
        let incidence = self
            .c_matrix()
            .rows()
            .iter()
            .map(|row| row.to_vec())
            .collect();
        let marking = self
            .places
            .iter()
            .map(|place| {
                i64::try_from(place.tokens()).map_err(|_| NetError::MarkingOutOfRange {
                    place: place.name().to_owned(),
                    tokens: place.tokens(),
                })
            })
            .collect::<Result<_, _>>()?;
        MatrixNet::new(incidence, marking)
    }

    /// Finds isolated nodes and nodes that can never take part in a firing.
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut isolated_places = Vec::new();
        let mut isolated_transitions = Vec::new();
        let mut warnings = Vec::new();

        for (place_id, place) in self.places.iter_enumerated() {
            let feeds = self.pre.rows()[place_id].iter().any(|w| *w > 0);
            let fed = self.post.rows()[place_id].iter().any(|w| *w > 0);

            if !feeds && !fed {
                isolated_places.push((place_id, place.name().to_owned()));
            } else if !fed && place.tokens() == 0 {
                warnings.push(format!(
                    "place `{}` has no incoming arc and no tokens, it can never be marked",
                    place.name()
                ));
            }
        }

        for (transition_id, transition) in self.transitions.iter_enumerated() {
            let has_input = self.input_arcs(transition_id).next().is_some();
            let has_output = self.output_arcs(transition_id).next().is_some();

            if !has_input && !has_output {
                isolated_transitions.push((transition_id, transition.name().to_owned()));
            } else if !has_input {
                warnings.push(format!(
                    "transition `{}` has no input arc, it can never fire",
                    transition.name()
                ));
            }
        }

        DiagnosticReport {
            isolated_places,
            isolated_transitions,
            warnings,
            total_places: self.places_len(),
            total_transitions: self.transitions_len(),
        }
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();
        if report.has_issues() {
            for line in report.to_string().lines() {
                log::warn!("{line}");
            }
        } else {
            log::info!(
                "net connectivity check passed ({} places, {} transitions)",
                report.total_places,
                report.total_transitions
            );
        }
    }
}

fn positive_weight(weight: i64) -> Result<Weight, NetError> {
    if weight <= 0 {
        return Err(NetError::InvalidWeight(weight));
    }
    Ok(weight.unsigned_abs())
}

fn orient(from: NodeId, to: NodeId) -> Option<(PlaceId, TransitionId, ArcDirection)> {
    match (from, to) {
        (NodeId::Place(place), NodeId::Transition(transition)) => {
            Some((place, transition, ArcDirection::PlaceToTransition))
        }
        (NodeId::Transition(transition), NodeId::Place(place)) => {
            Some((place, transition, ArcDirection::TransitionToPlace))
        }
        _ => None,
    }
}

/// Second half of the two-step connect started by [`Net::connect_place`] or
/// [`Net::connect_transition`].
///
/// The source kind is stated when the builder is created; the target kind
/// follows from the bipartite rule. Names that are not declared yet are
/// created with those kinds if [`EngineConfig::auto_create`] allows it.
#[must_use = "no arc is added until `to` is called"]
pub struct ArcBuilder<'n> {
    net: &'n mut Net,
    source: String,
    kind: NodeKind,
    weight: i64,
}

impl<'n> ArcBuilder<'n> {
    fn new(net: &'n mut Net, source: String, kind: NodeKind) -> Self {
        Self {
            net,
            source,
            kind,
            weight: 1,
        }
    }

    pub fn weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    pub fn to(self, target: impl Into<String>) -> Result<Arc, NetError> {
        let ArcBuilder {
            net,
            source,
            kind,
            weight,
        } = self;
        let target = target.into();
        positive_weight(weight)?;

        if source == target {
            return Err(NetError::InvalidArc {
                reason: ArcDefect::KindMismatch {
                    name: target.clone(),
                    expected: kind.opposite(),
                },
                from: source,
                to: target,
            });
        }

        // Both ends are checked before anything is declared.
        let from = net.declared_as(&source, &target, &source, kind)?;
        let to = net.declared_as(&source, &target, &target, kind.opposite())?;
        let from = match from {
            Some(node) => node,
            None => net.declare(&source, kind)?,
        };
        let to = match to {
            Some(node) => node,
            None => net.declare(&target, kind.opposite())?,
        };
        net.connect_weighted(from, to, weight)
    }
}

impl Net {
    fn declared_as(
        &self,
        from: &str,
        to: &str,
        name: &str,
        kind: NodeKind,
    ) -> Result<Option<NodeId>, NetError> {
        let reason = match self.node(name) {
            Some(node) if node.kind() == kind => return Ok(Some(node)),
            Some(_) => ArcDefect::KindMismatch {
                name: name.to_owned(),
                expected: kind,
            },
            None if self.config.auto_create => return Ok(None),
            None => ArcDefect::MissingEndpoint(name.to_owned()),
        };
        Err(NetError::InvalidArc {
            from: from.to_owned(),
            to: to.to_owned(),
            reason,
        })
    }

    fn declare(&mut self, name: &str, kind: NodeKind) -> Result<NodeId, NetError> {
        log::debug!("declaring {kind} `{name}` on first reference");
        match kind {
            NodeKind::Place => self.place(name, 0).map(NodeId::Place),
            NodeKind::Transition => self.transition(name).map(NodeId::Transition),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct NetRepr {
    #[serde(default)]
    config: EngineConfig,
    places: Vec<PlaceRepr>,
    #[serde(default)]
    transitions: Vec<String>,
    #[serde(default)]
    arcs: Vec<ArcRepr>,
}

#[derive(Serialize, Deserialize)]
struct PlaceRepr {
    name: String,
    #[serde(default)]
    tokens: Weight,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capacity: Option<Weight>,
}

#[derive(Serialize, Deserialize)]
struct ArcRepr {
    from: String,
    to: String,
    #[serde(default = "unit_weight")]
    weight: Weight,
}

fn unit_weight() -> Weight {
    1
}

impl From<&Net> for NetRepr {
    fn from(net: &Net) -> Self {
        let places = net
            .places
            .iter()
            .map(|place| PlaceRepr {
                name: place.name().to_owned(),
                tokens: place.tokens(),
                capacity: place.capacity(),
            })
            .collect();
        let transitions = net
            .transitions
            .iter()
            .map(|transition| transition.name().to_owned())
            .collect();
        let arcs = net
            .arcs()
            .map(|arc| {
                let place = net.places[arc.place].name().to_owned();
                let transition = net.transitions[arc.transition].name().to_owned();
                let (from, to) = if arc.is_input() {
                    (place, transition)
                } else {
                    (transition, place)
                };
                ArcRepr {
                    from,
                    to,
                    weight: arc.weight,
                }
            })
            .collect();
        Self {
            config: net.config.clone(),
            places,
            transitions,
            arcs,
        }
    }
}

impl TryFrom<NetRepr> for Net {
    type Error = NetError;

    fn try_from(repr: NetRepr) -> Result<Self, Self::Error> {
        let mut net = Net::with_config(repr.config);
        for place in repr.places {
            match place.capacity {
                Some(capacity) => net.place_with_capacity(place.name, place.tokens, capacity)?,
                None => net.place(place.name, place.tokens)?,
            };
        }
        for transition in repr.transitions {
            net.transition(transition)?;
        }
        for arc in repr.arcs {
            let weight =
                i64::try_from(arc.weight).map_err(|_| NetError::WeightOutOfRange(arc.weight))?;
            net.connect_weighted(arc.from.as_str(), arc.to.as_str(), weight)?;
        }
        Ok(net)
    }
}

impl Serialize for Net {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        NetRepr::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Net {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = NetRepr::deserialize(deserializer)?;
        Net::try_from(repr).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::index_vec::Idx;

    fn two_stage() -> Net {
        let mut net = Net::new();
        net.place("p1", 2).unwrap();
        net.place("p2", 0).unwrap();
        net.place("p3", 0).unwrap();
        net.transition("t1").unwrap();
        net.transition("t2").unwrap();
        net.connect("p1", "t1").unwrap();
        net.connect("t1", "p2").unwrap();
        net.connect("p2", "t2").unwrap();
        net.connect("t2", "p3").unwrap();
        net
    }

    #[test]
    fn add_place_and_transition_updates_incidence() {
        let mut net = Net::new();
        let p = net.place_with_capacity("p", 1, 5).unwrap();
        let t = net.transition("t").unwrap();

        net.connect(p, t).unwrap();
        net.connect_weighted(t, p, 3).unwrap();

        let (pre, post) = net.incidence();
        assert_eq!(net.places_len(), 1);
        assert_eq!(net.transitions_len(), 1);
        assert_eq!(net.arcs_len(), 2);
        assert_eq!(*pre.get(p, t), 1);
        assert_eq!(*post.get(p, t), 3);
        assert_eq!(*net.c_matrix().get(p, t), 2);
    }

    #[test]
    fn names_share_one_namespace() {
        let mut net = Net::new();
        net.transition("x").unwrap();
        assert_eq!(
            net.place("x", 0),
            Err(NetError::DuplicateName("x".to_string()))
        );
        assert_eq!(
            net.transition("x"),
            Err(NetError::DuplicateName("x".to_string()))
        );
        assert_eq!(net.places_len(), 0);
    }

    #[test]
    fn connect_rejects_same_kind_missing_and_duplicate() {
        let mut net = two_stage();
        assert!(matches!(
            net.connect("p1", "p2"),
            Err(NetError::InvalidArc { reason: ArcDefect::SameKind(NodeKind::Place), .. })
        ));
        assert!(matches!(
            net.connect("t1", "t2"),
            Err(NetError::InvalidArc { reason: ArcDefect::SameKind(NodeKind::Transition), .. })
        ));
        assert!(matches!(
            net.connect("p1", "nope"),
            Err(NetError::InvalidArc { reason: ArcDefect::MissingEndpoint(ref name), .. }) if name == "nope"
        ));
        assert!(matches!(
            net.connect("p1", "t1"),
            Err(NetError::InvalidArc { reason: ArcDefect::AlreadyConnected, .. })
        ));
        assert_eq!(net.connect_weighted("p1", "t2", 0), Err(NetError::InvalidWeight(0)));
        assert_eq!(net.arcs_len(), 4);
    }

    #[test]
    fn handles_from_another_net_do_not_resolve() {
        let mut net = two_stage();
        let foreign = TransitionId::from_usize(42);
        assert_eq!(
            net.can_fire(foreign),
            Err(NetError::UnknownTransition("t#42".to_string()))
        );
        assert!(net.connect("p1", foreign).is_err());
        assert_eq!(net.input_arcs(foreign).count(), 0);
        assert!(!net.is_enabled(foreign));
    }

    #[test]
    fn lookup_by_name_respects_kind() {
        let net = two_stage();
        assert!(net.place_id("p1").is_some());
        assert!(net.transition_id("p1").is_none());
        assert_eq!(net.find_place("p1").map(Place::tokens), Some(2));
        assert_eq!(net.find_transition("t2").map(Transition::name), Some("t2"));
        assert_eq!(net.tokens("t1"), Err(NetError::UnknownPlace("t1".to_string())));
        assert_eq!(net.can_fire("p1"), Err(NetError::UnknownTransition("p1".to_string())));
    }

    #[test]
    fn arcs_are_listed_per_transition() {
        let net = two_stage();
        let arcs = net
            .arcs()
            .map(|arc| {
                let from = net.node_name(arc.source()).unwrap().to_string();
                let to = net.node_name(arc.target()).unwrap().to_string();
                (from, to)
            })
            .collect::<Vec<_>>();
        assert_eq!(
            arcs,
            [("p1", "t1"), ("t1", "p2"), ("p2", "t2"), ("t2", "p3")]
                .map(|(a, b)| (a.to_string(), b.to_string()))
        );
        let t1 = net.transition_id("t1").unwrap();
        assert!(net.input_arcs(t1).all(|arc| arc.is_input()));
        assert!(net.output_arcs(t1).all(|arc| arc.is_output()));
    }

    #[test]
    fn set_weight_validates_and_updates() {
        let mut net = two_stage();
        assert_eq!(net.set_weight("t1", "p2", -2), Err(NetError::InvalidWeight(-2)));
        assert!(matches!(
            net.set_weight("p1", "t2", 2),
            Err(NetError::UnknownArc { .. })
        ));
        net.set_weight("t1", "p2", 2).unwrap();
        assert_eq!(net.arc("t1", "p2").map(|arc| arc.weight), Some(2));
        assert_eq!(net.arc("p2", "t1"), None);
    }

    #[test]
    fn transition_without_inputs_never_fires() {
        let mut net = Net::new();
        net.transition("source").unwrap();
        net.place("out", 0).unwrap();
        net.connect("source", "out").unwrap();
        assert_eq!(net.can_fire("source"), Ok(false));
        assert_eq!(
            net.fire("source"),
            Err(NetError::TransitionNotEnabled("source".to_string()))
        );
        assert_eq!(net.tokens("out"), Ok(0));
    }

    #[test]
    fn self_loop_is_enabled_at_capacity() {
        let mut net = Net::new();
        net.place_with_capacity("mutex", 1, 1).unwrap();
        net.transition("hold").unwrap();
        net.connect("mutex", "hold").unwrap();
        net.connect("hold", "mutex").unwrap();
        assert_eq!(net.can_fire("hold"), Ok(true));
        net.fire("hold").unwrap();
        assert_eq!(net.tokens("mutex"), Ok(1));
    }

    #[test]
    fn gate_policy_disables_transitions_that_would_overflow() {
        let mut net = Net::new();
        net.place("in", 3).unwrap();
        net.place_with_capacity("out", 0, 1).unwrap();
        net.transition("t").unwrap();
        net.connect("in", "t").unwrap();
        net.connect("t", "out").unwrap();

        net.fire("t").unwrap();
        assert_eq!(net.can_fire("t"), Ok(false));
        assert_eq!(net.fire("t"), Err(NetError::TransitionNotEnabled("t".to_string())));
        assert_eq!(net.tokens("in"), Ok(2));
        assert_eq!(net.tokens("out"), Ok(1));
    }

    #[test]
    fn reject_policy_fails_the_commit_without_mutation() {
        let config = EngineConfig {
            capacity_policy: CapacityPolicy::Reject,
            ..EngineConfig::default()
        };
        let mut net = Net::with_config(config);
        net.place("in", 3).unwrap();
        net.place_with_capacity("out", 1, 1).unwrap();
        net.transition("t").unwrap();
        net.connect("in", "t").unwrap();
        net.connect("t", "out").unwrap();

        assert_eq!(net.can_fire("t"), Ok(true));
        assert!(matches!(
            net.fire("t"),
            Err(NetError::CapacityExceeded { after: 2, capacity: 1, .. })
        ));
        assert_eq!(net.tokens("in"), Ok(3));
        assert_eq!(net.tokens("out"), Ok(1));
    }

    #[test]
    fn fluent_connect_declares_nodes_with_stated_kind() {
        let mut net = Net::new();
        net.connect_place("start").to("go").unwrap();
        net.connect_transition("go").weight(2).to("done").unwrap();

        assert!(net.place_id("start").is_some());
        assert!(net.transition_id("go").is_some());
        assert!(net.place_id("done").is_some());
        assert_eq!(net.arc("go", "done").map(|arc| arc.weight), Some(2));
        assert_eq!(net.tokens("start"), Ok(0));
    }

    #[test]
    fn fluent_connect_rejects_kind_conflicts_atomically() {
        let mut net = Net::new();
        net.place("p", 0).unwrap();
        let err = net.connect_transition("p").to("fresh").unwrap_err();
        assert!(matches!(
            err,
            NetError::InvalidArc { reason: ArcDefect::KindMismatch { expected: NodeKind::Transition, .. }, .. }
        ));
        assert!(net.node("fresh").is_none());

        let err = net.connect_place("fresh").to("p").unwrap_err();
        assert!(matches!(
            err,
            NetError::InvalidArc { reason: ArcDefect::KindMismatch { expected: NodeKind::Transition, .. }, .. }
        ));
        assert!(net.node("fresh").is_none());

        assert!(net.connect_place("loop").to("loop").is_err());
        assert!(net.node("loop").is_none());
        assert_eq!(net.connect_place("a").weight(0).to("b"), Err(NetError::InvalidWeight(0)));
        assert!(net.node("a").is_none());
    }

    #[test]
    fn fluent_connect_without_auto_create_requires_declarations() {
        let config = EngineConfig {
            auto_create: false,
            ..EngineConfig::default()
        };
        let mut net = Net::with_config(config);
        net.place("p", 1).unwrap();
        assert!(matches!(
            net.connect_place("p").to("t"),
            Err(NetError::InvalidArc { reason: ArcDefect::MissingEndpoint(ref name), .. }) if name == "t"
        ));
        net.transition("t").unwrap();
        net.connect_place("p").to("t").unwrap();
        assert_eq!(net.can_fire("t"), Ok(true));
    }

    #[test]
    fn adjust_tokens_checks_both_bounds() {
        let mut net = Net::new();
        net.place_with_capacity("p", 2, 4).unwrap();
        assert_eq!(net.adjust_tokens("p", 2), Ok(4));
        assert!(matches!(
            net.adjust_tokens("p", 1),
            Err(NetError::CapacityExceeded { after: 5, .. })
        ));
        assert!(matches!(
            net.adjust_tokens("p", -5),
            Err(NetError::NegativeMarking { requested: -1, .. })
        ));
        assert_eq!(net.adjust_tokens("p", -4), Ok(0));
    }

    #[test]
    fn restore_is_all_or_nothing() {
        let mut net = Net::new();
        net.place("a", 1).unwrap();
        net.place_with_capacity("b", 0, 2).unwrap();
        let snapshot = net.marking();

        let mut bad = Marking::new();
        bad.set("a", 7);
        bad.set("b", 3);
        assert!(matches!(net.restore(&bad), Err(NetError::CapacityExceeded { .. })));
        assert_eq!(net.marking(), snapshot);

        let mut unknown = Marking::new();
        unknown.set("a", 7);
        unknown.set("zzz", 1);
        assert_eq!(net.restore(&unknown), Err(NetError::UnknownPlace("zzz".to_string())));
        assert_eq!(net.marking(), snapshot);

        let mut good = Marking::new();
        good.set("b", 2);
        net.restore(&good).unwrap();
        assert_eq!(net.tokens("a"), Ok(1));
        assert_eq!(net.tokens("b"), Ok(2));
    }

    #[test]
    fn fire_sequence_reports_the_failing_step() {
        let mut net = two_stage();
        let err = net.fire_sequence(["t1", "t2", "t2"]).unwrap_err();
        assert_eq!(err.step, 2);
        assert_eq!(err.source, NetError::TransitionNotEnabled("t2".to_string()));
        assert_eq!(net.tokens("p1"), Ok(1));
        assert_eq!(net.tokens("p3"), Ok(1));
    }

    #[test]
    fn matrix_projection_matches_the_net() {
        let mut net = two_stage();
        let mut matrix = net.to_matrix_net().unwrap();
        assert_eq!(matrix.marking(), &[2, 0, 0]);
        assert_eq!(matrix.incidence(), &[vec![-1, 0], vec![1, -1], vec![0, 1]]);

        net.fire("t1").unwrap();
        matrix.fire_transition(0).unwrap();
        assert_eq!(net.to_matrix_net().unwrap().marking(), matrix.marking());
    }

    #[test]
    fn matrix_projection_refuses_markings_beyond_signed_range() {
        let mut net = two_stage();
        net.place("hoard", Weight::MAX).unwrap();
        assert_eq!(
            net.to_matrix_net(),
            Err(NetError::MarkingOutOfRange {
                place: "hoard".to_string(),
                tokens: Weight::MAX,
            })
        );
    }

    #[test]
    fn counter_limit_disables_the_transition_under_both_policies() {
        for policy in [CapacityPolicy::Gate, CapacityPolicy::Reject] {
            let mut net = Net::with_config(EngineConfig {
                capacity_policy: policy,
                ..EngineConfig::default()
            });
            net.place("src", 1).unwrap();
            net.place("dst", Weight::MAX - 1).unwrap();
            net.transition("t").unwrap();
            net.connect("src", "t").unwrap();
            net.connect_weighted("t", "dst", 5).unwrap();

            assert_eq!(net.can_fire("t"), Ok(false), "{policy:?}");
            assert_eq!(net.fire("t"), Err(NetError::TransitionNotEnabled("t".to_string())));
            assert_eq!(net.tokens("src"), Ok(1));
            assert_eq!(net.tokens("dst"), Ok(Weight::MAX - 1));

            net.set_weight("t", "dst", 1).unwrap();
            net.fire("t").unwrap();
            assert_eq!(net.tokens("dst"), Ok(Weight::MAX));
        }
    }

    #[test]
    fn adjust_tokens_refuses_to_overflow() {
        let mut net = two_stage();
        net.set_tokens("p3", i64::MAX).unwrap();
        net.adjust_tokens("p3", i64::MAX).unwrap();
        assert_eq!(net.tokens("p3"), Ok(Weight::MAX - 1));
        assert!(matches!(
            net.adjust_tokens("p3", 2),
            Err(NetError::TokenOverflow { tokens, added: 2, .. }) if tokens == Weight::MAX - 1
        ));
        assert_eq!(net.tokens("p3"), Ok(Weight::MAX - 1));
    }

    #[test]
    fn diagnostics_flag_isolated_and_unfireable_nodes() {
        let mut net = two_stage();
        net.place("lonely", 0).unwrap();
        net.transition("idle").unwrap();
        net.transition("spring").unwrap();
        net.connect("spring", "p3").unwrap();

        let report = net.diagnose_connectivity();
        assert!(report.has_issues());
        assert_eq!(report.isolated_places.len(), 1);
        assert_eq!(report.isolated_places[0].1, "lonely");
        assert_eq!(report.isolated_transitions.len(), 1);
        assert_eq!(report.isolated_transitions[0].1, "idle");
        assert!(report.warnings.iter().any(|w| w.contains("`spring`")));
        assert!(two_stage().diagnose_connectivity().warnings.is_empty());
    }
}
