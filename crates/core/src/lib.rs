//! Domain model for timed assessment attempts.
//!
//! Everything here is plain data plus validation: attempts and their
//! navigation grid, questions with their options, staged answers, submit
//! results and the proctoring violation log. No I/O lives in this crate.

#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod time;

pub use error::Error;
pub use time::Clock;
