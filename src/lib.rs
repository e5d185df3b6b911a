// Library exports for integration tests and reusable components

pub mod albums;
pub mod api;
pub mod config;
pub mod crypto;
pub mod duplicates;
pub mod processor;
pub mod remote;
pub mod shutdown;
pub mod store;
pub mod thumbnail;
pub mod upload;
pub mod watch;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
