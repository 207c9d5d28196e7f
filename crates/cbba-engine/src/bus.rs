//! In-process broadcast medium for running a whole fleet in one process.

use bytes::Bytes;
use cbba_core::{AgentId, InboundFrame, Transport};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

struct LossModel {
    probability: f64,
    rng: StdRng,
}

impl LossModel {
    fn should_drop(&mut self) -> bool {
        self.probability > 0.0 && self.rng.random::<f64>() < self.probability
    }
}

struct BusInner {
    members: RwLock<Vec<(AgentId, UnboundedSender<InboundFrame>)>>,
    loss: Mutex<LossModel>,
    delivered: AtomicU64,
    lost: AtomicU64,
}

/// Delivery counters for a [`LocalBus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub delivered: u64,
    pub lost: u64,
}

/// Broadcast bus connecting every member to every other member.
///
/// Each copy of a frame is dropped independently with the configured
/// probability, drawn from a seeded generator so runs are repeatable.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    pub fn new(loss: f64, seed: u64) -> Self {
        Self {
            inner: Arc::new(BusInner {
                members: RwLock::new(Vec::new()),
                loss: Mutex::new(LossModel {
                    probability: loss.clamp(0.0, 1.0),
                    rng: StdRng::seed_from_u64(seed),
                }),
                delivered: AtomicU64::new(0),
                lost: AtomicU64::new(0),
            }),
        }
    }

    /// Attach `agent`, returning its sending half and its inbound frames.
    pub fn join(&self, agent: AgentId) -> (BusTransport, UnboundedReceiver<InboundFrame>) {
        let (tx, rx) = unbounded_channel();
        self.inner.members.write().push((agent, tx));
        (
            BusTransport {
                agent,
                bus: self.inner.clone(),
            },
            rx,
        )
    }

    pub fn set_loss(&self, loss: f64) {
        self.inner.loss.lock().probability = loss.clamp(0.0, 1.0);
    }

    pub fn members(&self) -> usize {
        self.inner.members.read().len()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            lost: self.inner.lost.load(Ordering::Relaxed),
        }
    }
}

/// One member's handle for broadcasting on a [`LocalBus`].
#[derive(Clone)]
pub struct BusTransport {
    agent: AgentId,
    bus: Arc<BusInner>,
}

impl BusTransport {
    pub fn agent(&self) -> AgentId {
        self.agent
    }
}

impl Transport for BusTransport {
    fn broadcast(&self, frame: Bytes) {
        let members = self.bus.members.read();
        for (peer, tx) in members.iter() {
            if *peer == self.agent {
                continue;
            }
            if self.bus.loss.lock().should_drop() {
                self.bus.lost.fetch_add(1, Ordering::Relaxed);
                trace!(from = %self.agent, to = %peer, "frame lost");
                continue;
            }
            let sent = tx.send(InboundFrame {
                sender: self.agent,
                payload: frame.clone(),
            });
            if sent.is_ok() {
                self.bus.delivered.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
