//! CLI module for tierload - command-line interface and subcommands.
//!
//! Provides the entry point for inspecting a resource manifest: planning a
//! scheduling pass, simulating one with fake loaders, and validating the
//! dependency graph.

pub mod commands;

pub use commands::Cli;
