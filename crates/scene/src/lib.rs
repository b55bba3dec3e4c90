pub mod node;
pub mod world;

pub use node::*;
pub use world::*;
