pub mod traits;
pub mod manager;
pub mod notifiers;

pub use manager::NotificationDispatcher;
pub use traits::{NotifierPlugin, RenderSession, SessionLauncher};
