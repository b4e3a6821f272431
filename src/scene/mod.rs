/// Region arena, excerpts, policies and watermarks.
pub mod model;
/// Programmatic and JSON construction.
pub mod builder;
