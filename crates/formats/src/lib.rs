pub mod feature;
pub mod geojson;
pub mod topojson;

pub use feature::*;
pub use geojson::{decode_geojson, decode_geojson_str};
pub use topojson::{decode_topojson, decode_topojson_str};
