//! Performance benchmarks for the authorizer
//!
//! Run with:
//! ```bash
//! cargo bench --features=benchmarks
//! ```
//!
//! Results land in `target/criterion/`. The configuration cache sits on the
//! request path of every gateway call, so a cache hit should stay well
//! under a millisecond even with concurrent readers.

pub mod config_cache;
