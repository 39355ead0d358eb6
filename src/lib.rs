// Library exports for Snapgram
// The CLI, integration tests and any other front end build on these modules

pub mod api;
pub mod config;
pub mod error;
pub mod local_store;
pub mod models;
pub mod remote;
pub mod session;

pub use api::Api;
pub use error::{AppError, AppResult, ErrorKind};
pub use session::{AuthStatus, Landing, SessionState, SessionStore, SessionView};
