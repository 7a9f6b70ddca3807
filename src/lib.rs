//! Per-node agent that coordinates backups and restores across the members
//! of a replica set.
//!
//! Every member receives the same command; the [`agent::Agent`] makes sure
//! it runs on exactly one of them, using a distributed lock from
//! [`locks`] and a PITR handshake from [`pitr`].

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod locks;
pub mod log;
pub mod node;
pub mod pitr;
pub mod runner;

#[cfg(test)]
mod test_support;
