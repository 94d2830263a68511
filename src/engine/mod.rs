//! Pure hunt logic shared by the scan, progress and drawing services.

pub mod drawing;
pub mod progress;

pub use drawing::{ClassEntry, Entrant};
pub use progress::{CachedProgress, ProgressResult, ScanPoint, compute_progress};
