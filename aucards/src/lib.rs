//! Aucards library
//!
//! Card storage, live queries, screen state containers, preferences and
//! backup for the Aucards application. The `aucards` binary is a thin
//! command line driver over this crate.

pub mod app;
pub mod cli;
pub mod color;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod state;
pub mod storage;
