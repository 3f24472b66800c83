//! CLI domain: parse, route, and output only.
//! No display orchestration of its own; the route table drives the library entry points.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, OutputFormat};
pub use route::RunContext;
