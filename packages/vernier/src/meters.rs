//! The meter kinds and their builders.

mod counter;
mod custom;
mod function_counter;
mod function_timer;
mod gauge;
pub(crate) mod histogram;
mod long_task_timer;
mod summary;
mod timer;

pub use counter::*;
pub use custom::*;
pub use function_counter::{FunctionCounter, FunctionCounterBuilder};
pub use function_timer::*;
pub use gauge::*;
pub use histogram::{Bucket, HistogramSnapshot};
pub use long_task_timer::*;
pub use summary::*;
pub use timer::*;
