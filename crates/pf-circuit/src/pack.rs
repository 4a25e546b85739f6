//! Parallel/series pack topology generator.

use crate::builder::NetlistBuilder;
use crate::error::{CircuitError, CircuitResult};
use crate::netlist::Netlist;

/// Layout of an `Np` parallel × `Ns` series pack.
///
/// Cells are numbered series-group major: cell `s * parallel + p` is
/// position `p` of group `s`, counted from the negative terminal.
#[derive(Clone, Debug)]
pub struct PackLayout {
    pub parallel: usize,
    pub series: usize,
    /// Busbar between consecutive series groups (Ohm); 0 joins them directly.
    pub r_busbar: f64,
    /// Tab connection between each cell and its group busbar (Ohm); 0 omits it.
    pub r_connection: f64,
    /// Initial internal resistance of every cell (Ohm).
    pub r_internal: f64,
    /// Initial open-circuit voltage of every cell (V).
    pub ocv: f64,
    /// Initial terminal current (A).
    pub terminal_current: f64,
}

impl Default for PackLayout {
    fn default() -> Self {
        Self {
            parallel: 4,
            series: 1,
            r_busbar: 1e-4,
            r_connection: 1e-2,
            r_internal: 5e-2,
            ocv: 3.7,
            terminal_current: 1.0,
        }
    }
}

impl PackLayout {
    pub fn n_cells(&self) -> usize {
        self.parallel * self.series
    }
}

/// Build the netlist for `layout`.
pub fn pack_netlist(layout: &PackLayout) -> CircuitResult<Netlist> {
    if layout.parallel == 0 || layout.series == 0 {
        return Err(CircuitError::InvalidNetlist {
            what: format!(
                "pack must have at least one cell ({}p{}s)",
                layout.parallel, layout.series
            ),
        });
    }
    if layout.r_busbar < 0.0 || layout.r_connection < 0.0 {
        return Err(CircuitError::InvalidNetlist {
            what: "interconnect resistances must be non-negative".into(),
        });
    }

    let mut b = NetlistBuilder::new();
    let gnd = b.ground();
    let mut group_neg = gnd;
    let mut group_pos = gnd;

    for s in 0..layout.series {
        group_pos = b.add_node(format!("S{s}+"));
        for p in 0..layout.parallel {
            let tab = if layout.r_connection > 0.0 {
                let tab = b.add_node(format!("S{s}P{p}.tab"));
                b.add_resistor(format!("Rc.S{s}P{p}"), tab, group_pos, layout.r_connection);
                tab
            } else {
                group_pos
            };
            b.add_cell(
                format!("S{s}P{p}"),
                tab,
                group_neg,
                layout.ocv,
                layout.r_internal,
            );
        }
        if s + 1 < layout.series {
            group_neg = if layout.r_busbar > 0.0 {
                let next = b.add_node(format!("S{}-", s + 1));
                b.add_resistor(format!("Rb.S{s}"), group_pos, next, layout.r_busbar);
                next
            } else {
                group_pos
            };
        }
    }

    b.add_terminal("I.pack", group_pos, gnd, layout.terminal_current);
    b.build()
}
