//! Command implementations
//!
//! Each module corresponds to a subcommand in the CLI.

pub mod build;
pub mod chat;
pub mod corpus;
pub mod query;

pub use build::{filter as filter_run, run as build_run, BuildArgs, FilterArgs};
pub use chat::run as chat_run;
pub use query::run as query_run;
