pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod store;
pub mod styles;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;
