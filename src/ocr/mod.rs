pub mod engine;
pub mod extract;
pub mod preprocess;
