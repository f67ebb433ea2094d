//! Small, domain-agnostic helpers shared by the geometry and way-database crates: ordered
//! collections, free-form tags, progress/warning reporting, and logging setup.

#[macro_use]
extern crate log;

mod collections;
pub mod logger;
mod tags;
mod time;
mod utils;

pub use crate::collections::{Counter, MultiMap};
pub use crate::tags::Tags;
pub use crate::time::{elapsed_seconds, prettyprint_time, Timer};
pub use crate::utils::prettyprint_usize;

const PROGRESS_FREQUENCY_SECONDS: f64 = 0.2;
