pub mod bars;
pub mod spectrum;
