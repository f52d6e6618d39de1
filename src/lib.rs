#![forbid(unsafe_code)]

pub mod cli;
pub mod export;
pub mod fetch;
pub mod flatten;
pub mod formats;
pub mod logging;
pub mod sanitize;
pub mod xlsx;
