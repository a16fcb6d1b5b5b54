pub mod interaction;
pub mod navigation;
