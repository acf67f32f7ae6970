#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod generate;
pub mod logging;
pub mod openai;
pub mod pipeline;
pub mod prompts;
pub mod proposals;
pub mod salvage;
pub mod search;
