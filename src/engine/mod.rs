//! Execution front end for mirrorstack
//!
//! The engine wires the `declarative` crate to the terminal:
//! 1. Planning - Load state, refresh it, reconcile against a stack
//! 2. Display - Render plans and refresh findings
//! 3. Executing - Event sinks, fail-fast and the confirmation prompt

pub mod differ;
pub mod executor;
pub mod planner;
