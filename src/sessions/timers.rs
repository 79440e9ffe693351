use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};

use super::actor::ActorMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    /// Channel emptied; leave unless someone comes back.
    Grace,
    /// Receiver is active but no remote has shown up yet.
    FirstRemote,
    JoinTimeout,
    LeaveTimeout,
    /// Initiator's bound on waiting for the callee.
    CalleeDeadline,
    /// One-off check for remotes that joined before our listener saw them.
    PresencePoll,
}

struct ArmedTimer {
    id: u64,
    token: CancellationToken,
}

/// One-shot timers that report expiry back into the actor's mailbox.
///
/// Each arming gets its own id and cancellation token. An expiry is only honoured if it
/// carries the id of the timer currently armed for that kind and the token is still live,
/// so a cancelled or re-armed timer can never fire a stale transition.
pub(crate) struct Timers {
    armed: HashMap<TimerKind, ArmedTimer>,
    next_id: u64,
    mailbox: mpsc::UnboundedSender<ActorMessage>,
}

impl Timers {
    pub fn new(mailbox: mpsc::UnboundedSender<ActorMessage>) -> Self {
        Self {
            armed: HashMap::new(),
            next_id: 0,
            mailbox,
        }
    }

    pub fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.arm_at(kind, Instant::now() + delay);
    }

    pub fn arm_at(&mut self, kind: TimerKind, deadline: Instant) {
        self.cancel(kind);
        self.next_id += 1;
        let id = self.next_id;
        let token = CancellationToken::new();
        let mailbox = self.mailbox.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = sleep_until(deadline) => {
                    let _ = mailbox.send(ActorMessage::TimerFired { kind, id });
                }
            }
        });
        event!(Level::TRACE, kind = ?kind, id, "Armed timer");
        self.armed.insert(kind, ArmedTimer { id, token });
    }

    /// Claims an expiry. Returns `false` for expiries of cancelled or superseded timers.
    pub fn claim(&mut self, kind: TimerKind, id: u64) -> bool {
        match self.armed.get(&kind) {
            Some(timer) if timer.id == id && !timer.token.is_cancelled() => {
                self.armed.remove(&kind);
                true
            }
            _ => {
                event!(Level::TRACE, kind = ?kind, id, "Ignoring stale timer expiry");
                false
            }
        }
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(timer) = self.armed.remove(&kind) {
            timer.token.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.armed.drain() {
            timer.token.cancel();
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next_fired(rx: &mut mpsc::UnboundedReceiver<ActorMessage>) -> (TimerKind, u64) {
        match rx.recv().await {
            Some(ActorMessage::TimerFired { kind, id }) => (kind, id),
            _ => panic!("Expected a timer expiry"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_and_is_claimed_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        timers.arm(TimerKind::Grace, Duration::from_secs(2));
        let (kind, id) = next_fired(&mut rx).await;

        assert_eq!(kind, TimerKind::Grace);
        assert!(timers.claim(kind, id));
        assert!(!timers.claim(kind, id));
        assert!(!timers.is_armed(TimerKind::Grace));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_does_not_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        timers.arm(TimerKind::Grace, Duration::from_secs(2));
        timers.cancel(TimerKind::Grace);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        timers.arm(TimerKind::Grace, Duration::from_secs(1));
        let first_id = timers.armed[&TimerKind::Grace].id;
        timers.arm(TimerKind::Grace, Duration::from_secs(3));

        let (kind, id) = next_fired(&mut rx).await;
        assert_ne!(id, first_id);
        assert!(timers.claim(kind, id));
        assert!(!timers.claim(TimerKind::Grace, first_id));
    }
}
