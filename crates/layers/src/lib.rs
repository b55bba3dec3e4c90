pub mod batch;
pub mod dispatch;
pub mod extract;
pub mod layer;
pub mod picking;
pub mod symbology;
pub mod vector;

pub use layer::*;
pub use vector::{VectorLayer, VectorLayerOptions, VectorSource};
