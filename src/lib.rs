pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod observability;
pub mod services;

#[cfg(test)]
pub mod tests;

#[cfg(feature = "benchmarks")]
pub mod benchmarks;

pub use error::*;
pub use manager::{
    BackendAuth, BackendConfig, BackendParams, BackendRequest, BackendResponse,
    BackendTransaction, Manager, SystemRequest,
};
