//! Wake-up capability handed to the session by the consumer side.
//!
//! After every payload the engine pushes onto the outbound channel it calls
//! [`Notifier::notify`] so the consumer knows there is something to drain.
//! The call is best-effort: the payload is already queued when it runs, and
//! a panicking notifier is caught and logged by the engine.

/// Single-method wake-up hook.
pub trait Notifier: Send + Sync {
    fn notify(&self);
}

impl<F> Notifier for F
where
    F: Fn() + Send + Sync,
{
    fn notify(&self) {
        self()
    }
}

/// For consumers that poll the outbound channel on their own schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self) {}
}
