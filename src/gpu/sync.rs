//! Blocking bridge over wgpu's callback-driven completion model.
//!
//! Every potentially-blocking device operation in this harness (queue
//! completion, buffer mapping) registers a callback that sends into a
//! single-fire channel; the bridge then pumps the device's event queue on a
//! short fixed interval until the signal arrives. That turns each async
//! operation into an effectively-blocking call, which is what keeps the
//! host-side control flow strictly serialized: submit, wait, read, repeat.
//!
//! There is deliberately no timeout and no cancellation. A stalled device
//! operation blocks the calling thread indefinitely; the harness never has
//! two operations in flight at once.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use wgpu::{Device, Queue};

use crate::error::GpuError;

/// Interval between event-queue pumps while a completion is pending.
pub const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Blocks until the callback feeding `rx` fires, pumping the device's
/// event queue between checks.
///
/// `what` names the pending operation for the error path: the runtime
/// dropping a registered callback without firing it is the only way this
/// returns an error.
pub fn wait_signal<T>(device: &Device, rx: Receiver<T>, what: &'static str) -> Result<T, GpuError> {
    loop {
        let _ = device.poll(wgpu::PollType::Poll);

        match rx.try_recv() {
            Ok(value) => return Ok(value),
            Err(TryRecvError::Empty) => thread::sleep(POLL_INTERVAL),
            Err(TryRecvError::Disconnected) => return Err(GpuError::BridgeDisconnected(what)),
        }
    }
}

/// Blocks until everything submitted to `queue` so far has retired.
pub fn wait_queue(device: &Device, queue: &Queue) -> Result<(), GpuError> {
    let (tx, rx) = mpsc::channel();
    queue.on_submitted_work_done(move || {
        tx.send(()).ok();
    });
    wait_signal(device, rx, "queue completion")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::GpuSession;

    fn setup_session() -> Option<GpuSession> {
        GpuSession::negotiate().ok()
    }

    #[test]
    fn test_wait_signal_returns_sent_value() {
        let Some(session) = setup_session() else {
            println!("No GPU available, skipping bridge signal test");
            return;
        };

        let (tx, rx) = mpsc::channel();
        tx.send(42u32).unwrap();
        let got = wait_signal(&session.device, rx, "test").unwrap();
        assert_eq!(got, 42);
    }

    #[test]
    fn test_wait_signal_reports_dropped_callback() {
        let Some(session) = setup_session() else {
            println!("No GPU available, skipping dropped callback test");
            return;
        };

        let (tx, rx) = mpsc::channel::<u32>();
        drop(tx);
        let result = wait_signal(&session.device, rx, "test");
        assert!(matches!(result, Err(GpuError::BridgeDisconnected("test"))));
    }

    #[test]
    fn test_wait_queue_on_empty_submission() {
        let Some(session) = setup_session() else {
            println!("No GPU available, skipping queue wait test");
            return;
        };

        session.queue.submit(std::iter::empty());
        assert!(wait_queue(&session.device, &session.queue).is_ok());
    }
}
