pub mod area;
pub mod fragment;
pub mod line;

pub use area::build_area_fragment;
pub use fragment::{AreaFragment, LineFragment};
pub use line::build_line_fragment;
