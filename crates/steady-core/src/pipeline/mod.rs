pub mod config;
pub mod crop;
pub mod engine;
pub mod orchestrator;
pub mod replicate;
pub mod session;
pub mod types;

pub use config::RegistrationConfig;
pub use orchestrator::{register_session, register_session_with, RegisterOptions};
pub use session::{MovieSource, SessionRecord};
pub use types::{NoOpReporter, ProgressReporter, RegistrationStage};
