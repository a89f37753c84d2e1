//! Color representation for line and clear colors.

mod color;

pub use color::Color;
