/// Resolve, compile and execute a composition end to end.
pub mod pipeline;
