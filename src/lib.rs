//! Korean license plate reader: OCR output in, corroborated plate detections out.
//!
//! The crates are re-exported here so integration tests and embedders can
//! depend on one package.

pub use common;
pub use plate_service;
pub use telemetry;
