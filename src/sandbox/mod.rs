pub mod backend;
pub mod countdown;
pub mod manager;
pub mod session;
pub mod types;

pub use backend::{Desktop, SandboxBackend};
pub use manager::SessionManager;
pub use session::{Session, SessionHandle, SessionStatus};
