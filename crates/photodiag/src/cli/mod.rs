//! Command line client for the diagnosis server

pub mod client;
pub mod commands;
pub mod display;
