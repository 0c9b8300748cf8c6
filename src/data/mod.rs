//! Expression matrices and per-sample metadata.

mod matrix;
mod metadata;

pub use matrix::SampleMatrix;
pub use metadata::{ClassOrder, SampleMetadata};
