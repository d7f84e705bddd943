//! Command-line front end: argument parsing, config resolution and output.
pub mod cli;
pub mod config;
pub mod render;
