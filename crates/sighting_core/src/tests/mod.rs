//! Scenario tests exercising the service end to end
//!
//! - Viewport scenarios (enter, leave, re-target, antimeridian)
//! - Lifecycle (close, dropped handles)
//! - Concurrent reporters and slow consumers



#[cfg(test)]
pub mod concurrency_test;
