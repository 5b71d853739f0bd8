pub mod aggregate;
pub mod markers;
pub mod series;
