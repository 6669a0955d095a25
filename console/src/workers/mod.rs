pub mod progress;
pub mod refresher;
