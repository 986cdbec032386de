//! # relcount
//!
//! Command line front end for the relationship count cache. The binary in
//! `main.rs` only parses arguments and installs logging; everything else
//! lives here so it can be tested.

pub mod cli;
pub mod config;
