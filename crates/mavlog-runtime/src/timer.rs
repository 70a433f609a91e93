//! Single-shot acknowledgement timer

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

/// A restartable one-shot timer that can sit in a `tokio::select!` loop.
///
/// While disarmed, [`AckTimer::expired`] never completes.
#[derive(Debug, Default)]
pub struct AckTimer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl AckTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer to fire `after` from now, replacing any pending deadline
    pub fn arm(&mut self, after: Duration) {
        let deadline = Instant::now() + after;
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Complete once the armed deadline passes; the timer is disarmed afterwards
    pub async fn expired(&mut self) {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.sleep = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_deadline() {
        let mut timer = AckTimer::new();
        timer.arm(Duration::from_millis(1000));
        assert!(timer.is_armed());

        let start = Instant::now();
        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = AckTimer::new();
        timer.arm(Duration::from_millis(10));
        timer.cancel();

        let fired = tokio::time::timeout(Duration::from_secs(5), timer.expired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_disarmed_timer_stays_pending() {
        let mut timer = AckTimer::new();
        let mut expired = tokio_test::task::spawn(timer.expired());
        tokio_test::assert_pending!(expired.poll());
        tokio_test::assert_pending!(expired.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_moves_deadline() {
        let mut timer = AckTimer::new();
        timer.arm(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;
        timer.arm(Duration::from_millis(100));

        let start = Instant::now();
        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
