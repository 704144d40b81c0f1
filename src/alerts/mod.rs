/// Alert dispatch, cooldown tracking and notification transports
pub mod alert_manager;
pub mod cooldown;
pub mod notifier;

pub use alert_manager::{AlertDecision, AlertManager, AlertPolicy};
pub use cooldown::AlertCooldown;
pub use notifier::{MockNotifier, Notifier, WebhookNotifier};
