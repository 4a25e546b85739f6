//! pf-circuit: pack netlist and circuit solve for packflow.
//!
//! Provides:
//! - Netlist data structures (internal resistances, OCV sources, interconnects, terminal)
//! - Incremental netlist builder with validation
//! - Parallel/series pack topology generator
//! - Modified nodal analysis solver with current or power excitation
//!
//! # Example
//!
//! ```
//! use pf_circuit::{CircuitSolver, Excitation, MnaSolver, NetlistBuilder};
//!
//! let mut builder = NetlistBuilder::new();
//! let gnd = builder.ground();
//! let pos = builder.add_node("pack+");
//! builder.add_cell("cell0", pos, gnd, 3.7, 0.05);
//! builder.add_terminal("load", pos, gnd, 2.0);
//! let netlist = builder.build().unwrap();
//!
//! let sol = MnaSolver::default().solve(&netlist, Excitation::Current(2.0)).unwrap();
//! assert!((sol.terminal_voltage - 3.6).abs() < 1e-9);
//! assert!((sol.cell_currents[0] + 2.0).abs() < 1e-9);
//! ```

pub mod builder;
pub mod error;
pub mod jacobian;
pub mod netlist;
pub mod newton;
pub mod pack;
pub mod solve;
pub(crate) mod validate;

pub use builder::NetlistBuilder;
pub use error::{CircuitError, CircuitResult};
pub use netlist::{Branch, BranchKind, Netlist, Node};
pub use newton::{NewtonConfig, NewtonResult};
pub use pack::{PackLayout, pack_netlist};
pub use solve::{CircuitSolution, CircuitSolver, Excitation, MnaSolver};
