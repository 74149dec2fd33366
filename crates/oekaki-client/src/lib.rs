pub mod api;
pub mod config;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod retry;
pub mod session;
pub mod timer;

pub use api::CoordinatorApi;
pub use config::{AdvancePolicy, ClientConfig};
pub use error::ClientError;
pub use http::HttpApi;
pub use reconciler::{ChangeFeedReconciler, Update};
pub use session::ClientSession;
