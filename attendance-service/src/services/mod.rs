pub mod analysis;
pub mod image;
pub mod metrics;
pub mod providers;

pub use analysis::{AnalyzeError, Analyzer, AttendanceSnapshot};
