pub mod faces;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
