//! Flow execution engine.
//!
//! A flow is a graph of typed nodes joined by directed connections. The
//! [`FlowExecutor`] finds the entry nodes (nodes nothing points at), runs each
//! one through its handler, and feeds the result into every downstream node,
//! depth-first and strictly one node at a time. Every step transition is
//! pushed to a [`StatusObserver`] while the run is in flight.

pub mod dispatch;
pub mod executor;
pub mod graph;
pub mod handlers;
pub mod observer;
pub mod run_log;
pub mod template;

pub use dispatch::{NodeBehavior, ToolSelector};
pub use executor::{FlowExecutor, FlowRun};
pub use graph::{downstream_of, entry_nodes, preflight, FlowGraph, GraphReport};
pub use handlers::NodeHandlers;
pub use mangaba_core::traits::StatusObserver;
pub use observer::BusObserver;
pub use run_log::RunLogger;
pub use template::FlowTemplate;
