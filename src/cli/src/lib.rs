//! A3S Watch CLI - container update watcher.

pub mod commands;
pub mod output;
