#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod math;
pub mod ppm;
pub mod renderer;
pub mod scene;
