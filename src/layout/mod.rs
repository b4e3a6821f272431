/// Crop/pad/pan transforms.
pub mod fit;
/// Overlay cascade timing and placement.
pub mod cascade;
