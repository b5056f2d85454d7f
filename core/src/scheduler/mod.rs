//! Stream policies shared by the producer and consumer drivers.

pub mod policy;

pub use policy::{DecodePolicy, FailureMode, FailureTracker};
