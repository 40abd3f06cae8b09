pub mod builtin;
pub mod config;
pub mod eval;
pub mod global;
pub mod job;
pub mod parser;
pub mod prompt;
pub mod repl;
pub mod search;
pub mod text;
pub mod types;
