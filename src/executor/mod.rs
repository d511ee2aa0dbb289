pub mod actions;
pub mod dispatcher;
pub mod input;
pub mod safety;

pub use actions::{ActionName, ActionRequest, ActionResult, ActionVocabulary};
pub use dispatcher::Dispatcher;
