//! polycall host library
//!
//! This module exports the internal components of the host for testing purposes.

pub mod bootstrap;
pub mod call;
pub mod cli;
pub mod config;
