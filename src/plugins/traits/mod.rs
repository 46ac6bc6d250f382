pub mod notifier;
pub mod source;

pub use notifier::{HealthReport, NotificationEvent, NotificationResult, NotifierPlugin, TargetInfo};
pub use source::{IdentityPool, RenderSession, SessionIdentity, SessionLauncher};
