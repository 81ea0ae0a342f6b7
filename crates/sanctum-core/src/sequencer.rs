//! Response flow sequencer: per-agent delivery order and humanlike pacing.
//!
//! At most one response is in flight per agent; further submissions queue in
//! FIFO order for that agent. Delivery emits a typing event, pauses for
//! `min_delay + random()*variation`, then emits the finalized response and
//! drains the agent's queue with a fixed gap between entries. Agents never
//! block each other; the slot granularity is per agent.
//!
//! The pacing sleep is the subsystem's only deliberate suspension point. It
//! observes the shutdown signal: a response whose pacing was interrupted is
//! explicitly dropped with a `ResponseDropped` event, never left dangling.

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::SanctumConfig;
use crate::events::SanctumEvent;
use crate::session::now_ms;

#[derive(Debug, Default)]
struct AgentFlow {
    in_flight: bool,
    queue: VecDeque<String>,
}

/// Snapshot of sequencer load for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerStatus {
    pub active_deliveries: usize,
    pub queued_responses: usize,
    pub min_delay_ms: u64,
    pub variation_ms: u64,
    pub response_gap_ms: u64,
}

/// Serializes and paces each agent's outbound responses. Cheap to clone; all
/// clones share the same per-agent slots.
#[derive(Clone)]
pub struct ResponseSequencer {
    inner: Arc<SequencerInner>,
}

struct SequencerInner {
    flows: DashMap<String, AgentFlow>,
    config: SanctumConfig,
    events: broadcast::Sender<SanctumEvent>,
    shutdown: watch::Receiver<bool>,
}

impl ResponseSequencer {
    pub fn new(
        config: SanctumConfig,
        events: broadcast::Sender<SanctumEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(SequencerInner {
                flows: DashMap::new(),
                config,
                events,
                shutdown,
            }),
        }
    }

    /// Accepts a response for delivery. Begins immediately if the agent's
    /// slot is free, otherwise queues behind the in-flight delivery.
    /// Submissions for one agent are delivered strictly in submission order.
    pub fn submit(&self, agent_id: &str, response: impl Into<String>) {
        let response = response.into();
        {
            let mut flow = self.inner.flows.entry(agent_id.to_string()).or_default();
            if flow.in_flight {
                flow.queue.push_back(response);
                debug!(
                    target: "sanctum::sequencer",
                    agent_id = %agent_id,
                    queued = flow.queue.len(),
                    "Response queued behind in-flight delivery"
                );
                return;
            }
            flow.in_flight = true;
        }

        let inner = Arc::clone(&self.inner);
        let agent_id = agent_id.to_string();
        tokio::spawn(async move {
            inner.deliver_loop(agent_id, response).await;
        });
    }

    /// Current load snapshot: in-flight slots, queued responses, timing knobs.
    pub fn status(&self) -> SequencerStatus {
        let mut active = 0;
        let mut queued = 0;
        for flow in self.inner.flows.iter() {
            if flow.in_flight {
                active += 1;
            }
            queued += flow.queue.len();
        }
        SequencerStatus {
            active_deliveries: active,
            queued_responses: queued,
            min_delay_ms: self.inner.config.min_delay.as_millis() as u64,
            variation_ms: self.inner.config.variation.as_millis() as u64,
            response_gap_ms: self.inner.config.response_gap.as_millis() as u64,
        }
    }
}

impl SequencerInner {
    /// Delivers `response` and then drains the agent's queue. Runs on its own
    /// task; one such task exists per agent while its slot is occupied.
    async fn deliver_loop(self: Arc<Self>, agent_id: String, response: String) {
        let mut current = response;
        loop {
            let delay = self.pacing_delay();
            let _ = self.events.send(SanctumEvent::Typing {
                agent_id: agent_id.clone(),
                estimated_ms: delay.as_millis() as u64,
            });
            debug!(
                target: "sanctum::sequencer",
                agent_id = %agent_id,
                delay_ms = delay.as_millis() as u64,
                "Pacing response"
            );

            if !self.pause(delay).await {
                self.drop_pending(&agent_id, current);
                return;
            }

            if self
                .events
                .send(SanctumEvent::Response {
                    agent_id: agent_id.clone(),
                    content: current,
                    timestamp_ms: now_ms(),
                })
                .is_err()
            {
                // Outbound channel is gone. Keep draining this agent's queue
                // so later subscribers see later entries; other agents are
                // unaffected either way.
                warn!(
                    target: "sanctum::sequencer",
                    agent_id = %agent_id,
                    "Delivery failed: no event subscribers"
                );
            }

            match self.next_queued(&agent_id) {
                None => return,
                Some(next) => {
                    if !self.pause(self.config.response_gap).await {
                        self.drop_pending(&agent_id, next);
                        return;
                    }
                    current = next;
                }
            }
        }
    }

    /// Sleeps for `duration` unless shutdown arrives first. Returns false on
    /// shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            // A dropped shutdown sender means the process is tearing down.
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }

    /// Pops the next queued response, or frees the slot when the queue is
    /// empty.
    fn next_queued(&self, agent_id: &str) -> Option<String> {
        let mut flow = self.flows.get_mut(agent_id)?;
        match flow.queue.pop_front() {
            Some(next) => Some(next),
            None => {
                flow.in_flight = false;
                None
            }
        }
    }

    /// Shutdown path: report the interrupted response and everything still
    /// queued for this agent as dropped, then free the slot.
    fn drop_pending(&self, agent_id: &str, interrupted: String) {
        let mut dropped = vec![interrupted];
        if let Some(mut flow) = self.flows.get_mut(agent_id) {
            dropped.extend(flow.queue.drain(..));
            flow.in_flight = false;
        }
        info!(
            target: "sanctum::sequencer",
            agent_id = %agent_id,
            count = dropped.len(),
            "Dropping paced responses on shutdown"
        );
        for _ in dropped {
            let _ = self.events.send(SanctumEvent::ResponseDropped {
                agent_id: agent_id.to_string(),
                reason: "shutdown during pacing delay".to_string(),
            });
        }
    }

    fn pacing_delay(&self) -> Duration {
        let variation_ms = self.config.variation.as_millis() as u64;
        let jitter = if variation_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..variation_ms)
        };
        self.config.min_delay + Duration::from_millis(jitter)
    }
}
