pub mod actions;
pub mod duration;
pub mod telemetry;

mod start;
pub use self::start::start;

pub mod commands;
pub mod dispatch;
