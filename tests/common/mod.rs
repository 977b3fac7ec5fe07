//! Common test utilities for warc-worker integration tests

#[allow(dead_code)]
pub mod assertions;
#[allow(dead_code)]
pub mod fakes;
#[allow(dead_code)]
pub mod tracker;

#[allow(unused_imports)]
pub use assertions::*;
pub use fakes::*;
pub use tracker::*;
