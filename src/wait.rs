//! Per-bus delivered queue and the correlation wait primitive (spec §4.3
//! "Correlation").
//!
//! This is the list-scan-with-predicate form spec §9 calls for, not the
//! single-flag/single-slot form the original driver used — only list-scan
//! lets N concurrent outstanding requests on one bus each wake on their own
//! matching response (Testable property 3).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::frame::{Frame, FrameKind};

/// Which kind of delivered entry a waiter is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpectedKind {
    Pong,
    Response,
}

struct Delivered {
    frame: Frame,
    at: Instant,
}

/// A bus's delivered-response/pong queue plus the condition callers block
/// on.
pub(crate) struct BusWait {
    queue: Mutex<VecDeque<Delivered>>,
    condvar: Condvar,
}

impl BusWait {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        }
    }

    /// Post a decoded pong or control-response frame for a waiter to pick
    /// up, waking any blocked caller on this bus.
    pub(crate) fn post_delivered(&self, frame: Frame, reap_after: Duration, sweep_threshold: usize) {
        let mut q = self.queue.lock().unwrap();
        q.push_back(Delivered {
            frame,
            at: Instant::now(),
        });
        if q.len() >= sweep_threshold {
            reap(&mut q, reap_after);
        }
        self.condvar.notify_all();
    }

    /// Block until a delivered entry matching `expected`/`request` arrives,
    /// or `timeout` elapses.
    ///
    /// Entries scanned but not matching remain in place for other waiters
    /// (spec §4.3 step 3); entries older than `reap_after` are discarded
    /// opportunistically on every scan.
    pub(crate) fn wait_for(
        &self,
        request: &Frame,
        expected: ExpectedKind,
        timeout: Duration,
        reap_after: Duration,
    ) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut q = self.queue.lock().unwrap();
        loop {
            reap(&mut q, reap_after);

            if let Some(pos) = q
                .iter()
                .position(|d| matches(request, &d.frame, expected))
            {
                return Some(q.remove(pos).unwrap().frame);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timeout) = self.condvar.wait_timeout(q, deadline - now).unwrap();
            q = guard;
        }
    }
}

fn reap(q: &mut VecDeque<Delivered>, reap_after: Duration) {
    let now = Instant::now();
    q.retain(|d| now.duration_since(d.at) < reap_after);
}

/// The response-matches-request predicate (spec §4.3).
fn matches(request: &Frame, candidate: &Frame, expected: ExpectedKind) -> bool {
    match expected {
        ExpectedKind::Pong => candidate.kind == FrameKind::Pong,
        ExpectedKind::Response => {
            candidate.kind == FrameKind::Response
                && (candidate.is_error_response()
                    || (candidate.device_id() == request.device_id()
                        && candidate.control_code() == request.control_code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn matching_response_wakes_waiter() {
        let wait = Arc::new(BusWait::new());
        let request = Frame::control(FrameKind::Request, 2, b'C', &[]).unwrap();

        let waiter_wait = Arc::clone(&wait);
        let waiter_request = request.clone();
        let handle = thread::spawn(move || {
            waiter_wait.wait_for(
                &waiter_request,
                ExpectedKind::Response,
                Duration::from_millis(500),
                Duration::from_secs(5),
            )
        });

        thread::sleep(Duration::from_millis(20));
        let response = Frame::control(FrameKind::Response, 2, b'C', &[0x5A]).unwrap();
        wait.post_delivered(response.clone(), Duration::from_secs(5), 16);

        assert_eq!(handle.join().unwrap(), Some(response));
    }

    #[test]
    fn non_matching_entries_are_left_for_other_waiters() {
        let wait = BusWait::new();
        let req_a = Frame::control(FrameKind::Request, 1, b'A', &[]).unwrap();
        let req_b = Frame::control(FrameKind::Request, 2, b'B', &[]).unwrap();
        let resp_b = Frame::control(FrameKind::Response, 2, b'B', &[9]).unwrap();

        wait.post_delivered(resp_b.clone(), Duration::from_secs(5), 16);

        // Waiter for A should time out without consuming B's response.
        let outcome = wait.wait_for(
            &req_a,
            ExpectedKind::Response,
            Duration::from_millis(30),
            Duration::from_secs(5),
        );
        assert_eq!(outcome, None);

        // Waiter for B still finds its response.
        let outcome = wait.wait_for(
            &req_b,
            ExpectedKind::Response,
            Duration::from_millis(30),
            Duration::from_secs(5),
        );
        assert_eq!(outcome, Some(resp_b));
    }

    #[test]
    fn error_sentinel_matches_any_outstanding_request() {
        let wait = BusWait::new();
        let request = Frame::control(FrameKind::Request, 3, b'Z', &[]).unwrap();
        let error = Frame::control(FrameKind::Response, 0xFF, 7, &[]).unwrap();

        wait.post_delivered(error.clone(), Duration::from_secs(5), 16);
        let outcome = wait.wait_for(
            &request,
            ExpectedKind::Response,
            Duration::from_millis(30),
            Duration::from_secs(5),
        );
        assert_eq!(outcome, Some(error));
    }

    #[test]
    fn stale_entries_are_reaped() {
        let wait = BusWait::new();
        let stale = Frame::control(FrameKind::Response, 1, b'A', &[]).unwrap();
        wait.post_delivered(stale, Duration::from_millis(10), 16);
        thread::sleep(Duration::from_millis(40));

        let request = Frame::control(FrameKind::Request, 1, b'A', &[]).unwrap();
        let outcome = wait.wait_for(
            &request,
            ExpectedKind::Response,
            Duration::from_millis(20),
            Duration::from_millis(10),
        );
        assert_eq!(outcome, None);
    }

    #[test]
    fn timeout_leaves_no_state_for_a_later_caller() {
        let wait = BusWait::new();
        let request = Frame::control(FrameKind::Request, 4, b'D', &[]).unwrap();

        let outcome = wait.wait_for(
            &request,
            ExpectedKind::Response,
            Duration::from_millis(20),
            Duration::from_secs(5),
        );
        assert_eq!(outcome, None);
        assert!(wait.queue.lock().unwrap().is_empty());
    }
}
