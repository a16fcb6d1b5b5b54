pub mod elements;
pub mod screen;
pub mod types;
