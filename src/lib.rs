// Library exports for the binary and integration tests

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod upload_queue;

#[cfg(test)]
mod test_support;
