//! Progress tracking from tool side effects.
//!
//! Tools like the enhancer give no reliable progress channel, so progress is
//! derived from the number of output files (see [`ProgressWatcher`]) and,
//! best-effort, from percentages printed on their output.

mod percent;
mod types;
mod watcher;

pub use percent::{last_percentage, parse_percentages};
pub use types::{ProgressEvent, WatchError, WatchSettings};
pub use watcher::{count_matching, ProgressWatcher};
