/// Shared value types (ratios, colours, rectangles).
pub mod core;
/// Error taxonomy.
pub mod error;
/// Injectable randomness.
pub mod random;
