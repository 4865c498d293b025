//! Topology representations and the adapters between them.
//!
//! The canonical in-memory topology is the [`ConnectivityMap`]: for every
//! target node, the incoming connections grouped by source node. Each source
//! may contribute several parallel [`Connection`]s, each with its own
//! attribute record.
//!
//! ```text
//! ConnectivityMap = {
//!     target: { source: [Connection, ...], ... },
//!     ...
//! }
//! ```
//!
//! A dense [`AdjacencyMatrix`] (`matrix[source][target] = weight`) is accepted
//! at the boundary and can be reproduced from a map, but it collapses parallel
//! connections into a single scalar.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::label::NodeLabel;

/// Dense adjacency matrix: `matrix[source][target]`, 0 meaning "no edge".
pub type AdjacencyMatrix = Vec<Vec<f64>>;

/// Incoming connections of one node, keyed by source label.
pub type IncomingConnections = BTreeMap<NodeLabel, Vec<Connection>>;

/// Attribute key used for numeric edge weights.
pub const WEIGHT: &str = "weight";

/// Attribute record of a single directed connection.
///
/// Attributes are JSON values, so they may nest arbitrarily.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Connection(Map<String, Value>);

impl Connection {
    /// A connection without attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection carrying only a `weight` attribute.
    pub fn weighted(weight: f64) -> Self {
        Self::new().with(WEIGHT, weight)
    }

    /// Builder-style attribute insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Read an attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric `weight` attribute, if present.
    pub fn weight(&self) -> Option<f64> {
        self.0.get(WEIGHT).and_then(Value::as_f64)
    }

    /// All attributes.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Connection {
    fn from(attrs: Map<String, Value>) -> Self {
        Self(attrs)
    }
}

/// Canonical topology: target → source → parallel connection records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectivityMap(BTreeMap<NodeLabel, IncomingConnections>);

impl ConnectivityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node with no incoming connections. Existing entries are kept.
    pub fn insert_node(&mut self, label: impl Into<NodeLabel>) {
        self.0.entry(label.into()).or_default();
    }

    /// Add a connection from `source` to `target`, creating either node if absent.
    ///
    /// An existing connection between the same pair is kept; the new one is
    /// appended as a parallel edge.
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeLabel>,
        target: impl Into<NodeLabel>,
        connection: Connection,
    ) {
        let source = source.into();
        self.0.entry(source.clone()).or_default();
        self.0
            .entry(target.into())
            .or_default()
            .entry(source)
            .or_default()
            .push(connection);
    }

    /// Remove a node together with every connection it sources.
    ///
    /// Returns `false` if the node was not present.
    pub fn remove_node(&mut self, label: &NodeLabel) -> bool {
        if self.0.remove(label).is_none() {
            return false;
        }
        for incoming in self.0.values_mut() {
            incoming.remove(label);
        }
        true
    }

    /// Incoming connections of a node.
    pub fn incoming(&self, label: &NodeLabel) -> Option<&IncomingConnections> {
        self.0.get(label)
    }

    /// Mutable incoming connections of a node.
    pub fn incoming_mut(&mut self, label: &NodeLabel) -> Option<&mut IncomingConnections> {
        self.0.get_mut(label)
    }

    /// Check whether a node is present.
    pub fn contains(&self, label: &NodeLabel) -> bool {
        self.0.contains_key(label)
    }

    /// Node labels in ascending order.
    pub fn labels(&self) -> impl Iterator<Item = &NodeLabel> {
        self.0.keys()
    }

    /// Iterate `(target, incoming)` pairs in ascending target order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeLabel, &IncomingConnections)> {
        self.0.iter()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.0.len()
    }

    /// Number of connections, counting parallel edges individually.
    pub fn edge_count(&self) -> usize {
        self.0
            .values()
            .flat_map(|incoming| incoming.values())
            .map(Vec::len)
            .sum()
    }

    /// Check whether the map has no nodes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest integer label, if any.
    pub fn max_index(&self) -> Option<u64> {
        self.0.keys().filter_map(NodeLabel::index).max()
    }

    /// Unwrap into the underlying nested map.
    pub fn into_inner(self) -> BTreeMap<NodeLabel, IncomingConnections> {
        self.0
    }
}

impl From<BTreeMap<NodeLabel, IncomingConnections>> for ConnectivityMap {
    fn from(map: BTreeMap<NodeLabel, IncomingConnections>) -> Self {
        Self(map)
    }
}

impl FromIterator<(NodeLabel, IncomingConnections)> for ConnectivityMap {
    fn from_iter<T: IntoIterator<Item = (NodeLabel, IncomingConnections)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A topology as supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Topology {
    /// Dense adjacency matrix.
    Matrix(AdjacencyMatrix),
    /// Canonical connectivity map.
    Map(ConnectivityMap),
}

impl Topology {
    /// Detect the representation of an untyped JSON value.
    ///
    /// An array of numeric rows is a matrix, an object is a connectivity map;
    /// anything else is rejected.
    pub fn from_json(value: &Value) -> EngineResult<Self> {
        match value {
            Value::Array(rows) => {
                let matrix = rows
                    .iter()
                    .map(|row| {
                        row.as_array()
                            .ok_or_else(|| unsupported("matrix rows must be arrays"))?
                            .iter()
                            .map(|w| {
                                w.as_f64()
                                    .ok_or_else(|| unsupported("matrix entries must be numeric"))
                            })
                            .collect::<EngineResult<Vec<f64>>>()
                    })
                    .collect::<EngineResult<AdjacencyMatrix>>()?;
                Ok(Topology::Matrix(matrix))
            }
            Value::Object(_) => {
                let map = serde_json::from_value(value.clone())
                    .map_err(|e| unsupported(format!("malformed connectivity map: {e}")))?;
                Ok(Topology::Map(map))
            }
            other => Err(unsupported(format!(
                "expected an adjacency matrix or a connectivity map, found {}",
                json_kind(other)
            ))),
        }
    }

    /// Whether the caller supplied a dense matrix.
    pub fn is_matrix(&self) -> bool {
        matches!(self, Topology::Matrix(_))
    }

    /// Convert into the canonical representation.
    pub fn into_connectivity_map(self) -> EngineResult<ConnectivityMap> {
        match self {
            Topology::Matrix(matrix) => matrix_to_connectivity_map(&matrix),
            Topology::Map(map) => Ok(map),
        }
    }
}

impl From<AdjacencyMatrix> for Topology {
    fn from(matrix: AdjacencyMatrix) -> Self {
        Topology::Matrix(matrix)
    }
}

impl From<ConnectivityMap> for Topology {
    fn from(map: ConnectivityMap) -> Self {
        Topology::Map(map)
    }
}

fn unsupported(reason: impl Into<String>) -> EngineError {
    EngineError::UnsupportedTopology {
        reason: reason.into(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Convert any supported topology into a connectivity map.
pub fn to_connectivity_map(topology: impl Into<Topology>) -> EngineResult<ConnectivityMap> {
    topology.into().into_connectivity_map()
}

/// Convert a square adjacency matrix into a connectivity map.
///
/// For every target column, each row with a non-zero entry becomes a source
/// with a single connection whose `weight` is the matrix entry.
pub fn matrix_to_connectivity_map(matrix: &AdjacencyMatrix) -> EngineResult<ConnectivityMap> {
    let n = matrix.len();
    if n == 0 {
        return Err(unsupported("adjacency matrix is empty"));
    }
    if let Some((row, cols)) = matrix
        .iter()
        .enumerate()
        .find_map(|(i, r)| (r.len() != n).then_some((i, r.len())))
    {
        return Err(unsupported(format!(
            "adjacency matrix must be square: row {row} has {cols} columns, expected {n}"
        )));
    }

    let map = (0..n)
        .map(|target| {
            let incoming: IncomingConnections = (0..n)
                .filter(|&source| matrix[source][target] != 0.0)
                .map(|source| {
                    (
                        NodeLabel::from(source),
                        vec![Connection::weighted(matrix[source][target])],
                    )
                })
                .collect();
            (NodeLabel::from(target), incoming)
        })
        .collect();

    Ok(map)
}

/// Convert a connectivity map into a dense adjacency matrix.
///
/// Rows and columns follow ascending label order over every node that appears
/// as a target or a source. Each cell takes the `weight` of the first
/// connection record (1.0 when absent).
pub fn to_adjacency_matrix(map: &ConnectivityMap) -> AdjacencyMatrix {
    let mut labels: Vec<&NodeLabel> = map
        .iter()
        .flat_map(|(target, incoming)| std::iter::once(target).chain(incoming.keys()))
        .collect();
    labels.sort();
    labels.dedup();

    let position: BTreeMap<&NodeLabel, usize> =
        labels.iter().enumerate().map(|(i, l)| (*l, i)).collect();

    let n = labels.len();
    let mut matrix = vec![vec![0.0; n]; n];
    for (target, incoming) in map.iter() {
        let col = position[target];
        for (source, connections) in incoming {
            // Parallel connections collapse into one cell; a later write replaces an earlier one.
            if let Some(first) = connections.first() {
                matrix[position[source]][col] = first.weight().unwrap_or(1.0);
            }
        }
    }
    matrix
}

/// Structurally independent copy of a connectivity map.
///
/// Every nested attribute value is owned by the copy, so mutating the
/// original afterwards never shows through.
pub fn deep_copy(map: &ConnectivityMap) -> ConnectivityMap {
    map.clone()
}

/// Neighbourhood shape for two-dimensional lattices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighbourhood {
    /// Chebyshev distance `<= r`.
    Moore,
    /// Manhattan distance `<= r`.
    VonNeumann,
    /// Offset hexagonal grid: von Neumann plus the cells leaning towards the
    /// row's offset side.
    Hex,
}

impl Neighbourhood {
    /// Whether the offset `(da, db)` from a cell in `row` lies inside.
    fn contains(self, da: i64, db: i64, radius: i64, row: usize) -> bool {
        let von_neumann = da.abs() + db.abs() <= radius;
        match self {
            Neighbourhood::Moore => true,
            Neighbourhood::VonNeumann => von_neumann,
            // odd rows lean left, even rows lean right
            Neighbourhood::Hex if row % 2 == 1 => von_neumann || db < radius,
            Neighbourhood::Hex => von_neumann || -db < radius,
        }
    }
}

/// What happens to neighbourhoods at the edge of a lattice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Opposite edges are joined.
    #[default]
    Periodic,
    /// Cells past the edge do not exist; edge cells have smaller neighbourhoods.
    Fixed,
}

impl Boundary {
    /// Position `offset` away from `at` on an axis of length `len`.
    fn resolve(self, at: usize, offset: i64, len: usize) -> Option<usize> {
        let moved = at as i64 + offset;
        match self {
            Boundary::Periodic => Some(moved.rem_euclid(len as i64) as usize),
            Boundary::Fixed if (0..len as i64).contains(&moved) => Some(moved as usize),
            Boundary::Fixed => None,
        }
    }
}

/// Adjacency matrix of a periodic one-dimensional cellular automaton.
///
/// Every cell is connected to itself and to the `radius` cells on each side.
pub fn cellular_automaton(n: usize, radius: usize) -> EngineResult<AdjacencyMatrix> {
    cellular_automaton_with(n, radius, Boundary::Periodic)
}

/// [`cellular_automaton`] with an explicit boundary condition.
pub fn cellular_automaton_with(
    n: usize,
    radius: usize,
    boundary: Boundary,
) -> EngineResult<AdjacencyMatrix> {
    if n < 3 {
        return Err(unsupported("a one-dimensional automaton needs at least 3 cells"));
    }
    let r = radius as i64;
    let mut matrix = vec![vec![0.0; n]; n];
    for (c, row) in matrix.iter_mut().enumerate() {
        for offset in -r..=r {
            if let Some(other) = boundary.resolve(c, offset, n) {
                row[other] = 1.0;
            }
        }
    }
    Ok(matrix)
}

/// Adjacency matrix of a periodic two-dimensional cellular automaton.
///
/// Cells are numbered row-major; each cell is part of its own neighbourhood.
pub fn cellular_automaton_2d(
    rows: usize,
    cols: usize,
    radius: usize,
    neighbourhood: Neighbourhood,
) -> EngineResult<AdjacencyMatrix> {
    cellular_automaton_2d_with(rows, cols, radius, neighbourhood, Boundary::Periodic)
}

/// [`cellular_automaton_2d`] with an explicit boundary condition.
pub fn cellular_automaton_2d_with(
    rows: usize,
    cols: usize,
    radius: usize,
    neighbourhood: Neighbourhood,
    boundary: Boundary,
) -> EngineResult<AdjacencyMatrix> {
    let n = rows * cols;
    if n < 9 {
        return Err(unsupported("a two-dimensional automaton needs at least 9 cells"));
    }
    let r = radius as i64;
    let mut matrix = vec![vec![0.0; n]; n];
    for a in 0..rows {
        for b in 0..cols {
            let cell = a * cols + b;
            for da in -r..=r {
                for db in -r..=r {
                    if !neighbourhood.contains(da, db, r, a) {
                        continue;
                    }
                    let (Some(x), Some(y)) =
                        (boundary.resolve(a, da, rows), boundary.resolve(b, db, cols))
                    else {
                        continue;
                    };
                    matrix[cell][x * cols + y] = 1.0;
                }
            }
        }
    }
    Ok(matrix)
}

/// Bidirectional n-dimensional grid with unit weights.
///
/// Nodes are numbered row-major (last dimension fastest) starting at
/// `first_label`. Each node links to its immediate neighbour on either side
/// along every axis; `periodic` joins opposite faces and `self_loops` adds a
/// connection from every node to itself.
pub fn lattice(
    dims: &[usize],
    periodic: bool,
    self_loops: bool,
    first_label: u64,
) -> EngineResult<ConnectivityMap> {
    if dims.is_empty() || dims.contains(&0) {
        return Err(unsupported("a lattice needs at least one non-empty dimension"));
    }
    let boundary = if periodic {
        Boundary::Periodic
    } else {
        Boundary::Fixed
    };
    let n: usize = dims.iter().product();
    let label = |i: usize| NodeLabel::Index(first_label + i as u64);

    let mut map: ConnectivityMap = (0..n).map(|i| (label(i), IncomingConnections::new())).collect();
    for node in 0..n {
        let coords = unravel(node, dims);
        let mut neighbours = BTreeSet::new();
        for (axis, &len) in dims.iter().enumerate() {
            for step in [-1, 1] {
                if let Some(moved) = boundary.resolve(coords[axis], step, len) {
                    let mut other = coords.clone();
                    other[axis] = moved;
                    neighbours.insert(ravel(&other, dims));
                }
            }
        }
        neighbours.remove(&node);
        if self_loops {
            neighbours.insert(node);
        }
        for source in neighbours {
            map.add_edge(label(source), label(node), Connection::weighted(1.0));
        }
    }
    Ok(map)
}

fn unravel(mut index: usize, dims: &[usize]) -> Vec<usize> {
    let mut coords = vec![0; dims.len()];
    for (axis, &len) in dims.iter().enumerate().rev() {
        coords[axis] = index % len;
        index /= len;
    }
    coords
}

fn ravel(coords: &[usize], dims: &[usize]) -> usize {
    coords.iter().zip(dims).fold(0, |acc, (c, len)| acc * len + c)
}

/// Symmetric adjacency matrix of a Watts-Strogatz small-world graph.
///
/// Starts from a ring where every node links to its `k / 2` nearest
/// neighbours on each side, then rewires each ring edge `(u, u + j)` with
/// probability `p` to a uniformly drawn node that is neither `u` nor already
/// linked to it. The same `seed` always produces the same graph.
pub fn watts_strogatz(n: usize, k: usize, p: f64, seed: u64) -> EngineResult<AdjacencyMatrix> {
    if k > n {
        return Err(unsupported(format!(
            "watts-strogatz needs k <= n, got k = {k} and n = {n}"
        )));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(unsupported(format!(
            "rewiring probability must lie in [0, 1], got {p}"
        )));
    }

    fn link(links: &mut [BTreeSet<usize>], u: usize, v: usize, on: bool) {
        if on {
            links[u].insert(v);
            links[v].insert(u);
        } else {
            links[u].remove(&v);
            links[v].remove(&u);
        }
    }

    let mut links: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    if k == n {
        for u in 0..n {
            for v in u + 1..n {
                link(&mut links, u, v, true);
            }
        }
    } else {
        let half = k / 2;
        for j in 1..=half {
            for u in 0..n {
                link(&mut links, u, (u + j) % n, true);
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        for j in 1..=half {
            for u in 0..n {
                if rng.random::<f64>() >= p {
                    continue;
                }
                // a saturated node has nowhere to go
                if links[u].len() >= n - 1 {
                    continue;
                }
                let mut w = rng.random_range(0..n);
                while w == u || links[u].contains(&w) {
                    w = rng.random_range(0..n);
                }
                link(&mut links, u, (u + j) % n, false);
                link(&mut links, u, w, true);
            }
        }
    }

    let mut matrix = vec![vec![0.0; n]; n];
    for (u, row) in matrix.iter_mut().enumerate() {
        for &v in &links[u] {
            row[v] = 1.0;
        }
    }
    Ok(matrix)
}

/// A map of `n` nodes labelled `0..n` without any connections.
pub fn disconnected(n: usize) -> ConnectivityMap {
    (0..n)
        .map(|i| (NodeLabel::from(i), IncomingConnections::new()))
        .collect()
}
