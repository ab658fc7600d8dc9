mod cache;
mod eeg;
mod health;

pub use cache::*;
pub use eeg::*;
pub use health::*;
