//! Music Mirror - a caching and sync layer for music listening metadata.
//!
//! Tracks, albums, artists and play history come from a remote catalog API
//! and are mirrored into a local SQLite store. Reads go through one
//! interface, [`provider::ResourceProvider`], whether the data is local or
//! remote; a background [`sync::Synchronizer`] keeps play history current.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod lastfm;
pub mod model;
pub mod preserve;
pub mod provider;
pub mod remote;
pub mod sync;
#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
