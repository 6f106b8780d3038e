//! Overlord: a fleet-management broker multiplexing ghost agent control
//! connections to browser-side operators.
//!
//! The root crate exists to host the workspace integration suites under
//! `tests/integration/`; the broker itself lives in `services/broker`, the
//! wire types in `crates/ov-protocol`.
