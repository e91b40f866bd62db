//! Integration tests for the authorizer manager
//!
//! These drive [`crate::manager::Manager`] end to end against in-process
//! mocks of the control plane and backend, with Tokio's paused clock where
//! timing matters.

pub mod mocks;
