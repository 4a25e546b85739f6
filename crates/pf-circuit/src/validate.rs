//! Netlist validation.

use std::collections::VecDeque;

use crate::error::{CircuitError, CircuitResult};
use crate::netlist::{Branch, BranchKind, Node};

/// Every branch must refer to existing nodes.
pub(crate) fn validate_refs(nodes: &[Node], branches: &[Branch]) -> CircuitResult<()> {
    for branch in branches {
        for node in [branch.node1, branch.node2] {
            if node.idx() >= nodes.len() {
                return Err(CircuitError::InvalidNodeRef {
                    branch: branch.name.clone(),
                    node: node.index(),
                });
            }
        }
        if branch.node1 == branch.node2 {
            return Err(CircuitError::InvalidNetlist {
                what: format!("branch {} is shorted onto node {}", branch.name, branch.node1),
            });
        }
    }
    Ok(())
}

/// Values must be finite; resistances strictly positive.
pub(crate) fn validate_values(branches: &[Branch]) -> CircuitResult<()> {
    for branch in branches {
        if !branch.value.is_finite() {
            return Err(CircuitError::InvalidNetlist {
                what: format!("branch {} has non-finite value {}", branch.name, branch.value),
            });
        }
        if branch.kind.is_resistive() && branch.value <= 0.0 {
            return Err(CircuitError::InvalidNetlist {
                what: format!("resistor {} must be positive, got {}", branch.name, branch.value),
            });
        }
    }
    Ok(())
}

/// Every node needs a DC path to ground through resistors or voltage sources.
///
/// Current sources do not count: a node reachable only through the terminal
/// would leave the nodal matrix singular.
pub(crate) fn validate_grounded(nodes: &[Node], branches: &[Branch]) -> CircuitResult<()> {
    let mut adjacency = vec![Vec::new(); nodes.len()];
    for branch in branches {
        if branch.kind == BranchKind::CurrentSource {
            continue;
        }
        adjacency[branch.node1.idx()].push(branch.node2.idx());
        adjacency[branch.node2.idx()].push(branch.node1.idx());
    }

    let mut seen = vec![false; nodes.len()];
    let mut queue = VecDeque::from([0_usize]);
    seen[0] = true;
    while let Some(n) = queue.pop_front() {
        for &next in &adjacency[n] {
            if !seen[next] {
                seen[next] = true;
                queue.push_back(next);
            }
        }
    }

    match seen.iter().position(|&s| !s) {
        Some(i) => Err(CircuitError::FloatingNode {
            node: nodes[i].name.clone(),
        }),
        None => Ok(()),
    }
}
