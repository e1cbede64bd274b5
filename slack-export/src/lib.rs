pub mod api;
pub mod cli;
pub mod error;
pub mod export;
pub mod models;
pub mod pagination;
pub mod rate_limit;
pub mod services;
pub mod settings;
pub mod thread;
pub mod writer;
