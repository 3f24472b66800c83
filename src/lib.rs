//! Foldscope: Foldable Rich Display for Notebook Hosts
//!
//! Renders arbitrary values as interactive, foldable HTML. Slow leaves stream in
//! after the skeleton is shown, and rendered outputs can be relocated into the
//! host's current display slot. Scoped settings ride on thread-local context
//! values that deferred work captures and restores.

pub mod autovisualize;
pub mod capability;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod figures;
pub mod host;
pub mod integration;
pub mod logging;
pub mod magic;
pub mod repr;
pub mod streaming;
pub mod value;
