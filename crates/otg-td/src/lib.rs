//! # otg-td
//!
//! Session engine of the trade gateway.
//!
//! A [`session::SessionEngine`] owns one broker session: an inbound channel
//! fed by the transport, one worker thread draining it into a
//! [`TraderDriver`], the session's trading state behind a single lock, and an
//! outbound channel of JSON payloads for the consumer (risk engine, terminal,
//! API server). Broker specifics live entirely in the driver; the engine
//! supplies the concurrency.
//!
//! ## Provided drivers
//!
//! | Driver | Module | Purpose                                       |
//! |--------|--------|-----------------------------------------------|
//! | Sim    | `sim`  | Paper broker: accepts orders, fills on report |

pub mod notifier;
pub mod session;
pub mod sim;

use anyhow::Result;

pub use notifier::{NoopNotifier, Notifier};
pub use session::{SessionContext, SessionEngine, SessionStatus};

/// Trait implemented by every broker driver.
///
/// # Lifecycle
///
/// All methods run on the session's worker thread, one call at a time:
///
/// 1. [`on_init`](TraderDriver::on_init) once, right after `start` (send the
///    broker login, create the account record, ...).
/// 2. [`process_input`](TraderDriver::process_input) for every inbound
///    message, in arrival order, each run to completion.
/// 3. [`on_idle`](TraderDriver::on_idle) whenever a poll interval passes with
///    no input (heartbeats, reconnect checks, deferred flushes).
/// 4. [`on_finish`](TraderDriver::on_finish) once, after `stop` was requested.
///
/// A returned error or a panic never ends the session: the engine logs it and
/// reports it to the consumer as an `ERROR` notification.
///
/// Handlers must not block for long. The worker is the only thread that
/// dispatches, so a stalled handler stalls the whole session.
pub trait TraderDriver: Send + 'static {
    /// Human-readable driver name.
    fn name(&self) -> &str;

    fn on_init(&mut self, _ctx: &SessionContext) -> Result<()> {
        Ok(())
    }

    fn on_idle(&mut self, _ctx: &SessionContext) -> Result<()> {
        Ok(())
    }

    fn on_finish(&mut self, _ctx: &SessionContext) -> Result<()> {
        Ok(())
    }

    /// Handle one inbound message.
    fn process_input(&mut self, ctx: &SessionContext, msg: &str) -> Result<()>;
}
