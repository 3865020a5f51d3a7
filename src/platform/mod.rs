pub mod environment;
pub mod runtime;

pub use environment::{Delay, PlatformEnvironment};
