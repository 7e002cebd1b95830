#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod fabric;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod run;
pub mod worker;
