pub mod ocr;
pub mod sessions;
pub mod validation;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
