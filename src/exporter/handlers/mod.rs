mod health;
mod metrics;
mod ready;

pub use health::health;
pub use metrics::metrics;
pub use ready::ready;
