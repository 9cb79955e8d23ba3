//! Session engine: lifecycle, worker loop and emission path.
//!
//! # Architecture
//!
//! ```text
//! transport ──push──► input ──pop(poll)──► worker ──► TraderDriver
//!                                              │         │ mutates
//!                                              │         ▼
//!                                              │   Mutex<User> ──diff──┐
//!                                              ▼                       ▼
//!                                         on_idle (timeout)    output ──► consumer
//!                                                                 └─► Notifier
//! ```
//!
//! States move `Created → Running → Stopping → Stopped`. A stopped engine
//! may be started again: the worker hands the driver back when it exits.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result as AnyResult;
use otg_core::config::SessionConfig;
use otg_core::diff::{self, Section};
use otg_core::error::{GatewayError, Result};
use otg_core::{Channel, Notify, ReqLogin, User, NOTIFY_TYPE_MESSAGE};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, error, info, info_span, warn};

use crate::{Notifier, TraderDriver};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl SessionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionContext: shared between the worker and every caller thread
// ---------------------------------------------------------------------------

/// Everything of a session that outlives a single `start`/`stop` cycle and
/// is reachable from any thread.
///
/// Drivers receive `&SessionContext` in every hook; other threads can hold an
/// `Arc` from [`SessionEngine::context`].
pub struct SessionContext {
    label: String,
    config: SessionConfig,
    input: Channel,
    output: Channel,
    state: Mutex<User>,
    login: RwLock<Option<ReqLogin>>,
    notifier: Arc<dyn Notifier>,
    status: AtomicU8,
    finished: AtomicBool,
    notify_seq: AtomicU64,
}

impl SessionContext {
    fn new(label: String, config: SessionConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            label,
            config,
            input: Channel::new(),
            output: Channel::new(),
            state: Mutex::new(User::default()),
            login: RwLock::new(None),
            notifier,
            status: AtomicU8::new(SessionStatus::Created as u8),
            finished: AtomicBool::new(false),
            notify_seq: AtomicU64::new(0),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.status() == SessionStatus::Running
    }

    /// Whether the worker of the last run passed `on_finish`.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Ask the worker to leave its loop after the current message.
    ///
    /// Usable from inside a driver hook, where joining is impossible; the
    /// owner still calls [`SessionEngine::stop`] to reap the thread.
    pub fn request_stop(&self) {
        let _ = self.status.compare_exchange(
            SessionStatus::Running as u8,
            SessionStatus::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// The login captured by the last `start`.
    pub fn login(&self) -> Option<ReqLogin> {
        self.login.read().clone()
    }

    // -- Channels --

    pub fn input(&self) -> &Channel {
        &self.input
    }

    pub fn output(&self) -> &Channel {
        &self.output
    }

    pub fn push_input(&self, msg: impl Into<String>) {
        self.input.push(msg.into());
    }

    pub fn try_pop_output(&self) -> Option<String> {
        self.output.try_pop()
    }

    pub fn pop_output(&self, timeout: Duration) -> Option<String> {
        self.output.pop(timeout)
    }

    // -- State --

    /// Lock the trading state.
    ///
    /// The lock is not reentrant: drop the guard before calling any `emit_diff*`
    /// or `flush_dirty` method.
    pub fn state(&self) -> MutexGuard<'_, User> {
        self.state.lock()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut User) -> R) -> R {
        f(&mut self.state.lock())
    }

    // -- Emission --

    /// Push `payload` to the consumer, then wake it.
    ///
    /// Never call this while holding the [`state`](Self::state) guard: the
    /// notifier is free to read the state.
    pub fn emit(&self, payload: String) {
        self.output.push(payload);
        if panic::catch_unwind(AssertUnwindSafe(|| self.notifier.notify())).is_err() {
            warn!("[{}] wake-up notifier panicked; payload stays queued", self.label);
        }
    }

    pub fn emit_value(&self, payload: Map<String, Value>) {
        self.emit(Value::Object(payload).to_string());
    }

    /// Emit the current diff, even when it holds no record.
    pub fn emit_diff(&self) -> Result<()> {
        self.emit_diff_with(&[])
    }

    /// Emit the current diff plus the named full sections.
    ///
    /// The diff is taken under the state lock; the push and the wake-up
    /// happen after the lock is released.
    pub fn emit_diff_with(&self, sections: &[Section<'_>]) -> Result<()> {
        let payload = diff::serialize_with(&mut self.state.lock(), sections)?;
        self.emit_value(payload);
        Ok(())
    }

    /// Emit a diff only if some record is dirty or a section was named.
    ///
    /// Returns whether anything was emitted.
    pub fn flush_dirty(&self, sections: &[Section<'_>]) -> Result<bool> {
        let payload = {
            let mut user = self.state.lock();
            if sections.is_empty() && !user.has_dirty() {
                return Ok(false);
            }
            diff::serialize_with(&mut user, sections)?
        };
        self.emit_value(payload);
        Ok(true)
    }

    /// Emit a notification with `type = class_id` and `code = 0`.
    pub fn emit_notification(&self, class_id: i64, content: impl Into<String>, level: &str, kind: &str) {
        self.emit_notify(Notify {
            notify_type: class_id,
            code: 0,
            level: level.to_string(),
            kind: kind.to_string(),
            content: content.into(),
        });
    }

    /// Emit a prepared notification under the next `N<seq>` id.
    pub fn emit_notify(&self, notify: Notify) {
        let id = format!("N{}", self.notify_seq.fetch_add(1, Ordering::Relaxed) + 1);
        match diff::serialize_notify(&id, &notify) {
            Ok(payload) => self.emit_value(payload),
            Err(e) => error!("[{}] dropping notification {id}: {e}", self.label),
        }
    }

    /// Shorthand for an `INFO` message notification.
    pub fn notify_info(&self, content: impl Into<String>) {
        self.emit_notification(NOTIFY_TYPE_MESSAGE, content, "INFO", "MESSAGE");
    }

    /// Shorthand for a `WARNING` message notification.
    pub fn notify_warning(&self, content: impl Into<String>) {
        self.emit_notification(NOTIFY_TYPE_MESSAGE, content, "WARNING", "MESSAGE");
    }

    /// Shorthand for an `ERROR` message notification.
    pub fn notify_error(&self, content: impl Into<String>) {
        self.emit_notification(NOTIFY_TYPE_MESSAGE, content, "ERROR", "MESSAGE");
    }
}

// ---------------------------------------------------------------------------
// SessionEngine: owner of the worker thread
// ---------------------------------------------------------------------------

type Driver = Box<dyn TraderDriver>;

/// Worker bookkeeping, guarded by one lock so `start`/`stop` never overlap.
struct Lifecycle {
    /// Parked driver while no worker runs.
    driver: Option<Driver>,
    worker: Option<JoinHandle<Option<Driver>>>,
}

/// One broker session.
///
/// `start`/`stop` may be called from any thread. All other operations go
/// through the shared [`SessionContext`].
pub struct SessionEngine {
    ctx: Arc<SessionContext>,
    lifecycle: Mutex<Lifecycle>,
}

impl SessionEngine {
    /// Create an engine for `driver`; `notifier` is woken after every payload.
    pub fn new(
        label: impl Into<String>,
        driver: impl TraderDriver,
        notifier: Arc<dyn Notifier>,
        config: SessionConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(SessionContext::new(label.into(), config, notifier)),
            lifecycle: Mutex::new(Lifecycle { driver: Some(Box::new(driver)), worker: None }),
        }
    }

    pub fn context(&self) -> Arc<SessionContext> {
        Arc::clone(&self.ctx)
    }

    /// Parse a login payload (`{aid, bid, user_name, password, broker?}`) and start.
    pub fn start_json(&self, payload: &str) -> Result<()> {
        let login: ReqLogin = serde_json::from_str(payload)
            .map_err(|e| GatewayError::Validation(format!("malformed login request: {e}")))?;
        self.start(login)
    }

    /// Capture `login`, reset the trading state and spawn the worker.
    ///
    /// Fails without spawning anything on a malformed login or while a
    /// worker is already running.
    pub fn start(&self, login: ReqLogin) -> Result<()> {
        login.validate()?;
        let label = self.ctx.label.clone();

        let mut lc = self.lifecycle.lock();
        if lc.worker.is_some() && self.ctx.is_running() {
            return Err(GatewayError::AlreadyRunning(label));
        }
        // A worker that left on its own (request_stop) is reaped here.
        if let Some(stale) = lc.worker.take() {
            self.ctx.set_status(SessionStatus::Stopping);
            lc.driver = reap(&label, stale);
        }
        let Some(driver) = lc.driver.take() else {
            return Err(GatewayError::DriverUnavailable(label));
        };

        *self.ctx.state.lock() = User::new(login.user_name.clone());
        info!(
            "[{label}] starting session: driver={}, bid={}, user={}",
            driver.name(),
            login.bid,
            login.user_name
        );
        *self.ctx.login.write() = Some(login);
        self.ctx.finished.store(false, Ordering::Release);
        self.ctx.set_status(SessionStatus::Running);

        // The worker takes the driver out of the slot; if the thread never
        // starts, it is still there to be parked again.
        let slot = Arc::new(Mutex::new(Some(driver)));
        let ctx = Arc::clone(&self.ctx);
        let handed = Arc::clone(&slot);
        let mut builder = thread::Builder::new().name(format!("otg-{label}"));
        if let Some(size) = self.ctx.config.worker_stack_size {
            builder = builder.stack_size(size);
        }
        match builder.spawn(move || run_loop(ctx, handed)) {
            Ok(handle) => {
                lc.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("[{label}] failed to spawn worker: {e}");
                lc.driver = slot.lock().take();
                self.ctx.set_status(SessionStatus::Stopped);
                Err(GatewayError::Spawn(e))
            }
        }
    }

    /// Stop the worker and wait for it.
    ///
    /// Returns within one poll interval plus the duration of an in-flight
    /// handler. Calling it again, or before any `start`, does nothing.
    pub fn stop(&self) {
        let mut lc = self.lifecycle.lock();
        let Some(handle) = lc.worker.take() else {
            return;
        };
        self.ctx.set_status(SessionStatus::Stopping);
        lc.driver = reap(&self.ctx.label, handle);
        self.ctx.set_status(SessionStatus::Stopped);
        info!("[{}] session stopped", self.ctx.label);
    }

    pub fn status(&self) -> SessionStatus {
        self.ctx.status()
    }

    pub fn is_finished(&self) -> bool {
        self.ctx.is_finished()
    }

    pub fn login(&self) -> Option<ReqLogin> {
        self.ctx.login()
    }

    pub fn push_input(&self, msg: impl Into<String>) {
        self.ctx.push_input(msg);
    }

    pub fn try_pop_output(&self) -> Option<String> {
        self.ctx.try_pop_output()
    }

    pub fn pop_output(&self, timeout: Duration) -> Option<String> {
        self.ctx.pop_output(timeout)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut User) -> R) -> R {
        self.ctx.with_state(f)
    }

    pub fn emit(&self, payload: String) {
        self.ctx.emit(payload);
    }

    pub fn emit_diff(&self) -> Result<()> {
        self.ctx.emit_diff()
    }

    pub fn emit_notification(&self, class_id: i64, content: impl Into<String>, level: &str, kind: &str) {
        self.ctx.emit_notification(class_id, content, level, kind);
    }
}

impl Drop for SessionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Join a worker and take its driver back.
fn reap(label: &str, handle: JoinHandle<Option<Driver>>) -> Option<Driver> {
    match handle.join() {
        Ok(driver) => driver,
        Err(_) => {
            error!("[{label}] worker thread died; driver lost");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn run_loop(ctx: Arc<SessionContext>, slot: Arc<Mutex<Option<Driver>>>) -> Option<Driver> {
    let span = info_span!("session", label = %ctx.label);
    let _entered = span.enter();

    let mut driver = slot.lock().take()?;
    otg_core::cpu_affinity::maybe_bind(ctx.config.worker_cpu_core);
    let poll = ctx.config.poll_interval();
    info!("[{}] worker started (poll={poll:?}, driver={})", ctx.label, driver.name());

    guarded(&ctx, "on_init", || driver.on_init(&ctx));

    while ctx.is_running() {
        match ctx.input.pop(poll) {
            Some(msg) => {
                debug!("[{}] input: {msg}", ctx.label);
                guarded(&ctx, "process_input", || driver.process_input(&ctx, &msg));
            }
            None => guarded(&ctx, "on_idle", || driver.on_idle(&ctx)),
        }
    }

    guarded(&ctx, "on_finish", || driver.on_finish(&ctx));
    ctx.finished.store(true, Ordering::Release);
    info!("[{}] worker exited", ctx.label);
    Some(driver)
}

/// Run one driver hook; errors and panics become `ERROR` notifications.
fn guarded(ctx: &SessionContext, stage: &str, hook: impl FnOnce() -> AnyResult<()>) {
    let message = match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => return,
        Ok(Err(e)) => {
            warn!("[{}] {stage} failed: {e:#}", ctx.label);
            format!("{stage} failed: {e:#}")
        }
        Err(payload) => {
            let what = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("[{}] {stage} panicked: {what}", ctx.label);
            format!("{stage} panicked: {what}")
        }
    };
    ctx.notify_error(message);
}
