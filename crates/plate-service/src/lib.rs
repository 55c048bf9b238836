pub mod api;
pub mod config;
pub mod error;
pub mod locator;
pub mod plate;
pub mod state;
pub mod transport;

pub use config::PlateServiceConfig;
pub use error::{ApiError, SessionError};
pub use state::{FrameResponse, PlateServiceState};
