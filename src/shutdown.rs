use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// One-shot `running -> stopping` switch shared by everything that must stop
/// admitting work on a termination signal.
#[derive(Debug, Default)]
pub(crate) struct ShutdownController {
    stopping: AtomicBool,
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root scope, cancelled on the first trigger.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Moves to `stopping`. Only the first call has an effect and returns `true`.
    pub fn trigger(&self, reason: &str) -> bool {
        if self.stopping.swap(true, Ordering::SeqCst) {
            debug!("already stopping, ignoring {}", reason);
            return false;
        }
        info!("received signal: {}", reason);
        self.token.cancel();
        true
    }

    /// Waits for termination signals forever, triggering on the first one.
    pub async fn listen(&self) {
        let mut signals = match Signals::new() {
            Ok(signals) => signals,
            Err(e) => {
                error!("cannot install signal handlers: {}", e);
                return;
            }
        };
        loop {
            match signals.recv().await {
                Ok(name) => {
                    self.trigger(name);
                }
                Err(e) => {
                    error!("signal handling failed: {}", e);
                    return;
                }
            }
        }
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Signals {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::select! {
            _ = self.interrupt.recv() => Ok("interrupt"),
            _ = self.terminate.recv() => Ok("terminated"),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Signals)
    }

    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[test]
    fn trigger_is_one_shot() {
        let controller = ShutdownController::new();
        let token = controller.token();
        assert!(!controller.is_stopping());
        assert!(!token.is_cancelled());

        assert!(controller.trigger("interrupt"));
        assert!(controller.is_stopping());
        assert!(token.is_cancelled());

        assert!(!controller.trigger("interrupt"));
        assert!(!controller.trigger("terminated"));
        assert!(controller.is_stopping());
    }

    #[tokio::test]
    async fn concurrent_triggers_transition_once() {
        let controller = Arc::new(ShutdownController::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.trigger("test") })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_triggers_shutdown() {
        use tokio::signal::unix::{SignalKind, signal};

        // registering here replaces the default action before anything is raised
        let _guard = signal(SignalKind::terminate()).unwrap();
        let controller = Arc::new(ShutdownController::new());
        let token = controller.token();
        let listener = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.listen().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
        assert!(controller.is_stopping());
        listener.abort();
    }
}
