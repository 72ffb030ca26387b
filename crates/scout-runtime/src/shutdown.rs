//! Cooperative shutdown signalling.
//!
//! [`shutdown_channel`] returns a [`ShutdownTrigger`] (held by whoever decides
//! to stop: a Ctrl-C handler, a test) and a [`ShutdownSignal`] (held by the
//! exploration loop).  The loop checks [`ShutdownSignal::is_triggered`] at
//! the top of every state and races [`ShutdownSignal::triggered`] against
//! every suspension point, so a stop request never waits on a hanging
//! navigation goal.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(Arc::new(tx)), ShutdownSignal(rx))
}

/// Sending half.  Cheap to clone; safe to call from a non-async thread.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    /// Request shutdown.  Idempotent.
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Receiving half.
#[derive(Clone, Debug)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// A signal that can never fire.
    pub fn never() -> Self {
        shutdown_channel().1
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve once shutdown has been requested.  Pends forever when the
    /// trigger is dropped without firing.
    pub async fn triggered(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
