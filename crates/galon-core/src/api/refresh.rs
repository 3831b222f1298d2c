//! Coordination of token refresh episodes.
//!
//! A refresh episode starts when a request first sees a 401 and ends once the
//! session store has answered. Requests that see a 401 while an episode is
//! open do not refresh again: they join the episode's wait-list and are
//! released, in the order they joined, with the episode's outcome.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use super::error::AuthFailure;

/// Result delivered to every request waiting on an episode.
pub type EpisodeOutcome = Result<(), AuthFailure>;

#[derive(Debug, Default)]
struct EpisodeState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<EpisodeOutcome>>,
}

/// Owns the single in-flight refresh episode and its wait-list.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<EpisodeState>,
}

/// What a request that saw a 401 has to do next.
pub enum Participation {
    /// No episode was open; the caller now runs the refresh.
    Leader(Episode),
    /// An episode is already open; await its outcome.
    Waiter(oneshot::Receiver<EpisodeOutcome>),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, EpisodeState> {
        // Critical sections never panic midway, the state is always consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a refresh episode is currently open.
    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of requests parked on the open episode.
    pub fn pending(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Open an episode, or join the one already open.
    ///
    /// The check and the transition happen under one lock, so two requests
    /// can never both become leader.
    pub fn participate(self: &Arc<Self>) -> Participation {
        let mut state = self.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(position = state.waiters.len(), "Joined refresh episode");
            Participation::Waiter(rx)
        } else {
            state.in_flight = true;
            debug!("Opened refresh episode");
            Participation::Leader(Episode {
                coordinator: Arc::clone(self),
            })
        }
    }
}

/// Leadership of an open episode.
///
/// Dropping it closes the episode. Any request still parked at that point
/// (because the leader was cancelled, or because it joined after
/// [`Episode::release`]) sees its sender dropped.
pub struct Episode {
    coordinator: Arc<RefreshCoordinator>,
}

impl Episode {
    /// Settle every parked request with `outcome`, first joined first.
    ///
    /// Returns the number of requests that were still listening.
    pub fn release(&mut self, outcome: EpisodeOutcome) -> usize {
        let waiters = std::mem::take(&mut self.coordinator.lock().waiters);
        let total = waiters.len();
        // A waiter whose request was dropped no longer listens
        let delivered = waiters
            .into_iter()
            .filter(|tx| !tx.is_closed())
            .map(|tx| tx.send(outcome))
            .filter(Result::is_ok)
            .count();
        debug!(total, delivered, ok = outcome.is_ok(), "Released refresh waiters");
        delivered
    }
}

impl Drop for Episode {
    fn drop(&mut self) {
        let mut state = self.coordinator.lock();
        state.in_flight = false;
        let abandoned = state.waiters.len();
        state.waiters.clear();
        if abandoned > 0 {
            debug!(abandoned, "Refresh episode closed with requests still waiting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader(coordinator: &Arc<RefreshCoordinator>) -> Episode {
        match coordinator.participate() {
            Participation::Leader(episode) => episode,
            Participation::Waiter(_) => panic!("expected to lead the episode"),
        }
    }

    fn waiter(coordinator: &Arc<RefreshCoordinator>) -> oneshot::Receiver<EpisodeOutcome> {
        match coordinator.participate() {
            Participation::Waiter(rx) => rx,
            Participation::Leader(_) => panic!("expected to join the open episode"),
        }
    }

    #[test]
    fn test_first_participant_leads_rest_wait() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        assert!(!coordinator.is_refreshing());

        let _episode = leader(&coordinator);
        assert!(coordinator.is_refreshing());

        let _a = waiter(&coordinator);
        let _b = waiter(&coordinator);
        assert_eq!(coordinator.pending(), 2);
    }

    #[tokio::test]
    async fn test_release_success_settles_all_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let mut episode = leader(&coordinator);
        let a = waiter(&coordinator);
        let b = waiter(&coordinator);

        assert_eq!(episode.release(Ok(())), 2);
        drop(episode);

        assert_eq!(a.await.unwrap(), Ok(()));
        assert_eq!(b.await.unwrap(), Ok(()));
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test]
    async fn test_release_failure_settles_all_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let mut episode = leader(&coordinator);
        let a = waiter(&coordinator);

        episode.release(Err(AuthFailure::RefreshRejected));
        drop(episode);

        assert_eq!(a.await.unwrap(), Err(AuthFailure::RefreshRejected));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_release_settles_before_returning() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let mut episode = leader(&coordinator);
        let receivers: Vec<_> = (0..4).map(|_| waiter(&coordinator)).collect();

        episode.release(Ok(()));
        for mut rx in receivers {
            assert_eq!(rx.try_recv(), Ok(Ok(())));
        }
    }

    #[tokio::test]
    async fn test_waiters_released_in_join_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Mutex;

        let coordinator = Arc::new(RefreshCoordinator::new());
        let mut episode = leader(&coordinator);
        let started = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let tasks: Vec<_> = (0..4)
            .map(|position| {
                let rx = waiter(&coordinator);
                let started = Arc::clone(&started);
                let order = Arc::clone(&order);
                tokio::spawn(async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    rx.await.unwrap().unwrap();
                    order.lock().unwrap().push(position);
                })
            })
            .collect();

        // Every waiter is parked before the release
        while started.load(Ordering::SeqCst) < 4 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;

        episode.release(Ok(()));
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dropped_leader_closes_episode() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let episode = leader(&coordinator);
        let a = waiter(&coordinator);

        drop(episode);

        assert!(a.await.is_err());
        assert!(!coordinator.is_refreshing());
        // A new 401 opens a fresh episode
        let _next = leader(&coordinator);
    }

    #[test]
    fn test_cancelled_waiter_is_skipped() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let mut episode = leader(&coordinator);
        let a = waiter(&coordinator);
        let _b = waiter(&coordinator);
        drop(a);

        assert_eq!(episode.release(Ok(())), 1);
    }
}
