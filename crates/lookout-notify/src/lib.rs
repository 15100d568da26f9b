//! Notification fan-out.
//!
//! A fixed registry of channel adapters (SMTP email plus three chat
//! webhooks), each implementing the same small [`Notifier`] contract. The
//! [`fanout::NotifierSet`] dispatches one alert to every enabled channel
//! concurrently and treats delivery failure as non-fatal: errors are logged
//! and aggregated, never propagated to the engine.
//!
//! Adapters are self-contained; the only shared pieces are the mention
//! policy and the webhook signing helper in [`utils`].

pub mod channels;
pub mod error;
pub mod fanout;
pub mod utils;


use async_trait::async_trait;

use lookout_common::types::Alert;

pub use error::{NotifyError, Result};
pub use fanout::NotifierSet;

/// One delivery channel.
///
/// `send` blocks until the backend accepted or definitively rejected the
/// alert; adapters bound their own I/O with client timeouts and a short
/// retry loop, so the fan-out layer imposes no timeout of its own.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Stable channel name, also the key rules use to select channels.
    fn name(&self) -> &'static str;

    /// Whether configuration enables this channel.
    fn is_enabled(&self) -> bool;

    async fn send(&self, alert: &Alert) -> Result<()>;
}
