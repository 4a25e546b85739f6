//! Core netlist data structures.

use pf_core::{BranchId, NodeId, PfResult, ensure_finite, ensure_len};

use crate::error::{CircuitError, CircuitResult};

/// Role of a branch in the pack network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// Cell internal resistance; `cell` is the global cell index.
    InternalResistance { cell: usize },
    /// Interconnect resistance (busbar, tab, cable).
    Resistor,
    /// Cell open-circuit voltage; node1 is the positive side.
    VoltageSource { cell: usize },
    /// Pack terminal excitation, drawing current out of node1 into node2.
    CurrentSource,
}

impl BranchKind {
    pub fn is_resistive(self) -> bool {
        matches!(self, Self::InternalResistance { .. } | Self::Resistor)
    }
}

/// A circuit node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
}

/// A two-terminal branch.
///
/// Positive branch current flows from `node1` to `node2` through the element.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub kind: BranchKind,
    pub node1: NodeId,
    pub node2: NodeId,
    /// Ohms for resistive branches, volts for sources, amps for the terminal.
    pub value: f64,
}

/// A validated pack network with fixed topology.
///
/// Branch values may be rewritten between solves; nodes and branches may not.
#[derive(Debug, Clone)]
pub struct Netlist {
    pub(crate) nodes: Vec<Node>,
    pub(crate) branches: Vec<Branch>,
    /// Internal resistance branches in cell order.
    pub(crate) ri_branches: Vec<BranchId>,
    /// OCV source branches in cell order.
    pub(crate) v_branches: Vec<BranchId>,
    pub(crate) terminal: BranchId,
}

impl Netlist {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(id.idx())
    }

    /// Number of cells (voltage-source branches).
    pub fn n_cells(&self) -> usize {
        self.v_branches.len()
    }

    /// Number of nodes, ground included.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn voltage_source_branches(&self) -> &[BranchId] {
        &self.v_branches
    }

    pub fn internal_resistance_branches(&self) -> &[BranchId] {
        &self.ri_branches
    }

    pub fn terminal(&self) -> &Branch {
        &self.branches[self.terminal.idx()]
    }

    /// Overwrite every cell's open-circuit voltage.
    pub fn set_ocv(&mut self, ocv: &[f64]) -> PfResult<()> {
        ensure_len("ocv", self.v_branches.len(), ocv.len())?;
        for (&id, &v) in self.v_branches.iter().zip(ocv) {
            self.branches[id.idx()].value = ensure_finite(v, "ocv")?;
        }
        Ok(())
    }

    /// Overwrite every cell's internal resistance.
    pub fn set_internal_resistance(&mut self, ri: &[f64]) -> CircuitResult<()> {
        ensure_len("internal resistance", self.ri_branches.len(), ri.len())?;
        for (&id, &r) in self.ri_branches.iter().zip(ri) {
            let r = ensure_finite(r, "internal resistance")?;
            if r <= 0.0 {
                return Err(CircuitError::InvalidNetlist {
                    what: format!("internal resistance of cell branch {} is {r}", id),
                });
            }
            self.branches[id.idx()].value = r;
        }
        Ok(())
    }

    /// Store the solved pack current on the terminal source.
    pub fn set_terminal_value(&mut self, value: f64) -> PfResult<()> {
        let id = self.terminal;
        self.branches[id.idx()].value = ensure_finite(value, "terminal excitation")?;
        Ok(())
    }

    /// Current OCV values in cell order.
    pub fn ocv(&self) -> Vec<f64> {
        self.v_branches
            .iter()
            .map(|id| self.branches[id.idx()].value)
            .collect()
    }

    /// Current internal resistances in cell order.
    pub fn internal_resistance(&self) -> Vec<f64> {
        self.ri_branches
            .iter()
            .map(|id| self.branches[id.idx()].value)
            .collect()
    }
}
