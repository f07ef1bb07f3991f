pub mod annotate;
pub mod api;
pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod poller;
pub mod processor;
pub mod search;
pub mod state;

pub use config::FaceServiceConfig;
pub use error::{RecognitionError, SearchError};
pub use processor::FaceRecognitionProcessor;
pub use state::FaceServiceState;
