pub mod grounding;
pub mod live_view;
pub mod screenshot;
pub mod traits;
pub mod types;

pub use screenshot::Screenshot;
pub use traits::VisualLocator;
pub use types::Point;
