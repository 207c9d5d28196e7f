//! Network-receipt side: decode frames and hand them to the mailbox.

use cbba_concurrent::Mailbox;
use cbba_core::{decode, DecodeError, InboundFrame};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

/// Decode one frame and deliver it. Malformed frames are logged, counted
/// and never reach the mailbox.
pub fn deliver_frame(mailbox: &Mailbox, frame: &InboundFrame) -> Result<(), DecodeError> {
    match decode(&frame.payload) {
        Ok(msg) => {
            counter!("cbba_messages_received").increment(1);
            mailbox.deliver(msg);
            Ok(())
        }
        Err(e) => {
            counter!("cbba_decode_failures").increment(1);
            warn!(from = %frame.sender, error = %e, "discarding malformed frame");
            Err(e)
        }
    }
}

/// Receive frames until the channel closes.
pub async fn pump_frames(mailbox: Arc<Mailbox>, mut rx: UnboundedReceiver<InboundFrame>) {
    while let Some(frame) = rx.recv().await {
        let _ = deliver_frame(&mailbox, &frame);
    }
    debug!("frame channel closed");
}

/// Deliver every frame already waiting on `rx` without blocking.
///
/// Returns the number of frames delivered successfully.
pub fn drain_frames(mailbox: &Mailbox, rx: &mut UnboundedReceiver<InboundFrame>) -> usize {
    let mut delivered = 0;
    while let Ok(frame) = rx.try_recv() {
        if deliver_frame(mailbox, &frame).is_ok() {
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cbba_core::{encode, AgentId, BidRecord, Message, TaskId};
    use tokio::sync::mpsc::unbounded_channel;

    fn frame(payload: Bytes) -> InboundFrame {
        InboundFrame {
            sender: AgentId(9),
            payload,
        }
    }

    fn sample() -> Message {
        Message::new(AgentId(2), TaskId(1), &BidRecord::claimed(AgentId(2), 4.25, 77))
    }

    #[test]
    fn valid_frame_is_delivered() {
        let mailbox = Mailbox::with_capacity(4).unwrap();
        deliver_frame(&mailbox, &frame(encode(&sample()))).unwrap();
        assert_eq!(mailbox.drain(), vec![sample()]);
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let mailbox = Mailbox::with_capacity(4).unwrap();
        let err = deliver_frame(&mailbox, &frame(Bytes::from_static(b"short"))).unwrap_err();
        assert!(matches!(err, DecodeError::WrongLength { actual: 5, .. }));
        assert_eq!(mailbox.pending_inbound(), 0);
    }

    #[test]
    fn drain_counts_good_frames_only() {
        let mailbox = Mailbox::with_capacity(4).unwrap();
        let (tx, mut rx) = unbounded_channel();
        tx.send(frame(encode(&sample()))).unwrap();
        tx.send(frame(Bytes::from_static(b"garbage"))).unwrap();
        tx.send(frame(encode(&sample()))).unwrap();

        assert_eq!(drain_frames(&mailbox, &mut rx), 2);
        assert_eq!(mailbox.pending_inbound(), 2);
        assert_eq!(drain_frames(&mailbox, &mut rx), 0);
    }

    #[tokio::test]
    async fn pump_runs_until_channel_closes() {
        let mailbox = Arc::new(Mailbox::with_capacity(4).unwrap());
        let (tx, rx) = unbounded_channel();
        let task = tokio::spawn(pump_frames(mailbox.clone(), rx));

        tx.send(frame(encode(&sample()))).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(mailbox.drain(), vec![sample()]);
    }
}
