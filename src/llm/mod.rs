pub mod capabilities;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod tools;
pub mod types;

pub use capabilities::{models, ModelKind};
pub use provider::{LlmProvider, ModelStream};
pub use registry::ProviderRegistry;
