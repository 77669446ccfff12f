//! Subcommand implementations.

pub mod check;
pub mod heal;
pub mod reposition;
