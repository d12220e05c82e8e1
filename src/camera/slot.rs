//! Hand-off between a capture request and a frame-producing thread.

use std::sync::{Arc, Mutex};

use log::warn;

use super::CaptureReply;
use crate::{error::CaptureError, photo::RawCapture};

#[derive(Default)]
struct SlotState {
    running: bool,
    reply: Option<CaptureReply>,
}

/// Holds at most one parked [`CaptureReply`] for a producer thread.
///
/// A reply is only parked while the producer is marked running, and
/// [`ReplySlot::finish`] answers whatever is parked, so every request gets
/// exactly one result.
#[derive(Clone, Default)]
pub struct ReplySlot {
    state: Arc<Mutex<SlotState>>,
}

impl ReplySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the producer as running. Call before spawning it.
    pub fn open(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.running = true;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().map(|state| state.running).unwrap_or(false)
    }

    /// Park `reply` for the producer, or answer it with
    /// [`CaptureError::NotStarted`] when no producer is running.
    pub fn park(&self, reply: CaptureReply) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return reply.deliver(Err(CaptureError::Backend("capture slot poisoned".into()))),
        };
        if !state.running {
            drop(state);
            return reply.deliver(Err(CaptureError::NotStarted));
        }
        if let Some(previous) = state.reply.replace(reply) {
            warn!("capture superseded by a newer request");
            previous.deliver(Err(CaptureError::Backend("superseded by a newer capture".into())));
        }
    }

    /// Answer the parked reply, if any, with `frame`.
    pub fn fulfil(&self, frame: impl FnOnce() -> RawCapture) {
        let reply = self.state.lock().ok().and_then(|mut state| state.reply.take());
        if let Some(reply) = reply {
            reply.deliver(Ok(frame()));
        }
    }

    /// Mark the producer as gone and fail the parked reply with `error`.
    pub fn finish(&self, error: CaptureError) {
        let reply = self.state.lock().ok().and_then(|mut state| {
            state.running = false;
            state.reply.take()
        });
        if let Some(reply) = reply {
            reply.deliver(Err(error));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{camera::Facing, store::FixedClock};
    use image::RgbaImage;

    fn request() -> (CaptureReply, crate::camera::PendingCapture) {
        CaptureReply::pair(Facing::Back, Box::new(FixedClock(3)))
    }

    #[test]
    fn closed_slot_answers_not_started() {
        let slot = ReplySlot::new();
        let (reply, pending) = request();
        slot.park(reply);
        assert!(matches!(pending.wait(), Err(CaptureError::NotStarted)));
    }

    #[test]
    fn running_slot_answers_with_next_frame() {
        let slot = ReplySlot::new();
        slot.open();
        let (reply, mut pending) = request();
        slot.park(reply);
        assert!(pending.try_take().is_none());

        slot.fulfil(|| RawCapture::new(RgbaImage::new(3, 2), 0));
        let image = pending.try_take().unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[test]
    fn producer_exit_fails_parked_reply() {
        let slot = ReplySlot::new();
        slot.open();
        let (reply, pending) = request();
        slot.park(reply);

        slot.finish(CaptureError::NoDevice(Facing::Front));
        assert!(!slot.is_running());
        assert!(matches!(pending.wait(), Err(CaptureError::NoDevice(Facing::Front))));

        // later requests are answered right away
        let (reply, pending) = request();
        slot.park(reply);
        assert!(matches!(pending.wait(), Err(CaptureError::NotStarted)));
    }

    #[test]
    fn producer_thread_exit_is_seen_by_waiter() {
        let slot = ReplySlot::new();
        slot.open();
        let (reply, pending) = request();
        slot.park(reply);

        let producer = slot.clone();
        std::thread::spawn(move || producer.finish(CaptureError::Backend("gone".into())))
            .join()
            .unwrap();
        assert!(matches!(pending.wait(), Err(CaptureError::Backend(_))));
    }
}
