pub mod analyze;
pub mod health;
pub mod pages;

pub use analyze::{analyze, method_not_allowed};
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use pages::index;
