//! Device drivers.
//!
//! Real hardware drivers implement the traits in [`crate::hal`] against
//! their device protocol; the wire format is driver-internal. Only the
//! simulated drivers ship with the core.

pub mod sim;
