//! Command line parsing and pipeline execution for the `ish` shell.
//!
//! A line is parsed into a [`PipelineSpec`] by [`parser`] and handed to an
//! [`Executor`], which forks one process per stage, wires the stages together
//! with pipes, runs builtins in-process where they need to be, and reaps the
//! children. Results follow one convention throughout: `0` for success, `N`
//! for a program that exited with `N`, `-N` for one killed by signal `N`.

pub mod builtin;
pub mod config;
pub mod eval;
pub mod global;
pub mod parser;
pub mod types;

pub use eval::Executor;
pub use parser::{parse_command, parse_pipeline, ParseError, Parser};
pub use types::{CommandSpec, PipelineSpec};
