pub mod cli;
pub mod collector;
pub mod config;
pub mod exec;
pub mod harness;
pub mod pipeline;
pub mod sink;
pub mod source;
