//! Persistent, content-addressed storage for transcoded excerpts.

pub mod store;
