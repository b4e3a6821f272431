/// Cache keys for transcoded excerpts.
pub mod fingerprint;
/// Backend-agnostic render plan types.
pub mod plan;
/// Lowering from a resolved plan to transcode and compose work.
pub mod compiler;
