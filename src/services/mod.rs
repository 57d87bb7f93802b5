#[macro_use]
pub mod utils;
pub mod agent;
pub mod session;
pub mod stream_parser;
pub mod provider_common;
pub mod claude;
pub mod dummy;
pub mod formatter;
pub mod interceptor;
pub mod interrupt;
pub mod config;
