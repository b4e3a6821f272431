/// Resolved plan types and advisories.
pub mod resolved;
/// The region tree walk.
pub mod tree;
