pub mod atlas;
pub mod font;
pub mod gradient;
pub mod grid;
pub mod mapping;
pub mod raster;
pub mod series;
