/// The backend seam.
pub mod backend;
/// Source metadata and its per-run memo.
pub mod probe;
