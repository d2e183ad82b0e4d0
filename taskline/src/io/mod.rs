//! I/O helpers: configuration, memory store, providers and prompts.

pub mod config;
pub mod frontmatter;
pub mod init;
pub mod memory;
pub mod process;
pub mod prompt;
pub mod provider;
pub mod session_store;
