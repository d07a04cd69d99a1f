//! Cooperative stop signal
//!
//! A [`ShutdownTrigger`] flips a watch channel once; every [`Shutdown`]
//! clone observes it. Long-running loops check it between units of work.

use tokio::sync::watch;

/// Sending half of the stop signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half of the stop signal
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/receiver pair
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Signal every receiver
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Another receiver for this trigger
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    /// A receiver that is never triggered
    pub fn never() -> Self {
        channel().1
    }

    /// Whether the stop signal was raised
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the stop signal is raised
    ///
    /// Pends forever if the trigger is dropped without firing.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_waiters() {
        let (trigger, shutdown) = channel();
        let mut waiter = shutdown.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        assert!(!shutdown.is_triggered());
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
        assert!(trigger.subscribe().is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut shutdown = Shutdown::never();
        assert!(!shutdown.is_triggered());
        let result = tokio::time::timeout(Duration::from_secs(60), shutdown.wait()).await;
        assert!(result.is_err());
    }
}
