//! Integration tests for the foldscope display system

mod test_utils;

mod config_integration;
mod context_scoping;
mod dispatch_policy;
mod magics;
mod streaming_render;
