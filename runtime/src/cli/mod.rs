//! Subcommand implementations for the `flipbook-dl` binary.

pub mod doctor;
pub mod get_cmd;
pub mod output;
pub mod progress_display;
