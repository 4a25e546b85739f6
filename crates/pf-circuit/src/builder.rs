//! Incremental netlist builder.

use pf_core::{BranchId, NodeId};

use crate::error::{CircuitError, CircuitResult};
use crate::netlist::{Branch, BranchKind, Netlist, Node};
use crate::validate;

/// Builder for constructing a netlist incrementally.
///
/// Node 0 is ground and exists from the start. Cells are numbered in the order
/// they are added; that order is the global cell index everywhere else.
#[derive(Debug)]
pub struct NetlistBuilder {
    nodes: Vec<Node>,
    branches: Vec<Branch>,
    ri_branches: Vec<BranchId>,
    v_branches: Vec<BranchId>,
    terminals: Vec<BranchId>,
}

impl Default for NetlistBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetlistBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                id: NodeId::from_index(0),
                name: "gnd".into(),
            }],
            branches: Vec::new(),
            ri_branches: Vec::new(),
            v_branches: Vec::new(),
            terminals: Vec::new(),
        }
    }

    /// The ground (reference) node.
    pub fn ground(&self) -> NodeId {
        NodeId::from_index(0)
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            name: name.into(),
        });
        id
    }

    fn push_branch(
        &mut self,
        name: String,
        kind: BranchKind,
        node1: NodeId,
        node2: NodeId,
        value: f64,
    ) -> BranchId {
        let id = BranchId::from_index(self.branches.len() as u32);
        self.branches.push(Branch {
            id,
            name,
            kind,
            node1,
            node2,
            value,
        });
        id
    }

    /// Add an interconnect resistor.
    pub fn add_resistor(
        &mut self,
        name: impl Into<String>,
        node1: NodeId,
        node2: NodeId,
        ohms: f64,
    ) -> BranchId {
        self.push_branch(name.into(), BranchKind::Resistor, node1, node2, ohms)
    }

    /// Add a cell between `pos` and `neg`.
    ///
    /// A cell is an OCV source in series with its internal resistance, joined
    /// at a private internal node. Returns the cell index.
    pub fn add_cell(
        &mut self,
        name: impl Into<String>,
        pos: NodeId,
        neg: NodeId,
        ocv: f64,
        internal_resistance: f64,
    ) -> usize {
        let name = name.into();
        let cell = self.v_branches.len();
        let internal = self.add_node(format!("{name}.int"));
        let v = self.push_branch(
            format!("V.{name}"),
            BranchKind::VoltageSource { cell },
            internal,
            neg,
            ocv,
        );
        let ri = self.push_branch(
            format!("Ri.{name}"),
            BranchKind::InternalResistance { cell },
            internal,
            pos,
            internal_resistance,
        );
        self.v_branches.push(v);
        self.ri_branches.push(ri);
        cell
    }

    /// Add the pack terminal source, drawing `current` out of `pos` into `neg`.
    pub fn add_terminal(
        &mut self,
        name: impl Into<String>,
        pos: NodeId,
        neg: NodeId,
        current: f64,
    ) -> BranchId {
        let id = self.push_branch(name.into(), BranchKind::CurrentSource, pos, neg, current);
        self.terminals.push(id);
        id
    }

    /// Validate and freeze into a `Netlist`.
    pub fn build(self) -> CircuitResult<Netlist> {
        validate::validate_refs(&self.nodes, &self.branches)?;
        validate::validate_values(&self.branches)?;
        validate::validate_grounded(&self.nodes, &self.branches)?;

        let terminal = match self.terminals.as_slice() {
            [only] => *only,
            other => {
                return Err(CircuitError::InvalidNetlist {
                    what: format!("expected exactly one terminal source, found {}", other.len()),
                });
            }
        };
        if self.v_branches.is_empty() {
            return Err(CircuitError::InvalidNetlist {
                what: "netlist has no cells".into(),
            });
        }
        if self.v_branches.len() != self.ri_branches.len() {
            return Err(CircuitError::InvalidNetlist {
                what: format!(
                    "{} voltage sources but {} internal resistances",
                    self.v_branches.len(),
                    self.ri_branches.len()
                ),
            });
        }

        Ok(Netlist {
            nodes: self.nodes,
            branches: self.branches,
            ri_branches: self.ri_branches,
            v_branches: self.v_branches,
            terminal,
        })
    }
}
