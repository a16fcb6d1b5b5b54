pub mod criteria;
pub mod engine;
pub mod fallback;
pub mod parser;
pub mod prompts;
pub mod types;
pub mod watch;
