use std::fmt;
use std::sync::PoisonError;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

#[cfg(loom)]
use loom::sync::{Arc, Condvar, Mutex, MutexGuard};
#[cfg(not(loom))]
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Level-triggered event shared between threads.
///
/// Once set, the event stays set until [`Event::reset`] is called, and every
/// wait returns immediately in the meantime. Clones refer to the same event.
#[derive(Clone)]
pub struct Event {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    cond: Condvar,
}

struct State {
    signaled: bool,
    closed: bool,
    wakers: Vec<Waker>,
}

impl Event {
    pub fn new(signaled: bool) -> Event {
        Event {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    signaled,
                    closed: false,
                    wakers: Vec::new(),
                }),
                cond: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_set(&self) -> bool {
        self.lock().signaled
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn set(&self) {
        let wakers = {
            let mut state = self.lock();
            state.signaled = true;
            std::mem::take(&mut state.wakers)
        };

        self.inner.cond.notify_all();
        wakers.into_iter().for_each(Waker::wake);
    }

    pub fn reset(&self) {
        self.lock().signaled = false;
    }

    /// Marks the event as closed, releasing every waiter.
    ///
    /// Waits on a closed event no longer block; they report whether the event
    /// is set. Closing twice is a no-op.
    pub fn close(&self) {
        let wakers = {
            let mut state = self.lock();
            if state.closed {
                return;
            }

            state.closed = true;
            std::mem::take(&mut state.wakers)
        };

        self.inner.cond.notify_all();
        wakers.into_iter().for_each(Waker::wake);
    }

    /// Blocks until the event is set.
    ///
    /// Returns `false` if the event got closed while unset.
    pub fn wait(&self) -> bool {
        let mut state = self.lock();
        while !state.signaled && !state.closed {
            state = self
                .inner
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.signaled
    }

    /// Blocks until the event is set or `timeout` elapses.
    ///
    /// A timeout too large to represent as a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };

        let mut state = self.lock();
        while !state.signaled && !state.closed {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);

            state = guard;
        }

        state.signaled
    }

    pub fn poll_wait(&self, context: &mut Context<'_>) -> Poll<bool> {
        let mut state = self.lock();
        if state.signaled || state.closed {
            return Poll::Ready(state.signaled);
        }

        if !state.wakers.iter().any(|w| w.will_wake(context.waker())) {
            state.wakers.push(context.waker().clone());
        }

        Poll::Pending
    }

    pub async fn wait_async(&self) -> bool {
        std::future::poll_fn(|context| self.poll_wait(context)).await
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Event")
            .field("signaled", &state.signaled)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #[cfg(not(loom))]
    use std::thread;

    #[cfg(loom)]
    use loom::thread;

    use super::*;

    #[test]
    #[cfg(not(loom))]
    fn initial_state() {
        assert!(Event::new(true).is_set());
        assert!(!Event::new(false).is_set());
    }

    #[test]
    #[cfg(not(loom))]
    fn stays_set_until_reset() {
        let event = Event::new(false);
        event.set();

        assert!(event.wait());
        assert!(event.wait());
        assert!(event.wait_timeout(Duration::ZERO));

        event.reset();
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    #[cfg(not(loom))]
    fn unrepresentable_timeout() {
        let event = Event::new(true);
        assert!(event.wait_timeout(Duration::MAX));

        let event = Event::new(false);
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait_timeout(Duration::MAX))
        };

        event.set();
        assert!(waiter.join().unwrap());
    }

    #[test]
    #[cfg(not(loom))]
    fn clones_share_state() {
        let event = Event::new(false);
        let clone = event.clone();

        clone.set();
        assert!(event.is_set());

        event.reset();
        assert!(!clone.is_set());
    }

    #[test]
    #[cfg(not(loom))]
    fn close_releases_waiters() {
        let event = Event::new(false);
        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait())
        };

        event.close();
        assert!(!waiter.join().unwrap());
        assert!(event.is_closed());
        assert!(!event.wait());

        event.close();
    }

    #[test]
    #[cfg(not(loom))]
    fn wait_async() {
        let event = Event::new(false);
        let setter = {
            let event = event.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                event.set();
            })
        };

        assert!(futures::executor::block_on(event.wait_async()));
        setter.join().unwrap();
    }

    fn do_set_wakes_waiters() {
        let event = Event::new(false);

        let waiters = (0..2)
            .map(|_| {
                let event = event.clone();
                thread::spawn(move || event.wait())
            })
            .collect::<Vec<_>>();

        event.set();

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    #[cfg(not(loom))]
    fn set_wakes_waiters() {
        do_set_wakes_waiters();
    }

    #[test]
    #[cfg(loom)]
    fn set_wakes_waiters() {
        loom::model(do_set_wakes_waiters);
    }
}
