// Simulation events and the typed observer bus.
//
// Everything observable that happens during a step is published as a
// `SimEvent`: state changes (by state name, for UI/visual collaborators),
// clock minutes, job lifecycle, stuck/recovery milestones, and structure
// lifecycle. Each event kind belongs to one `EventTopic`.
//
// `EventBus` delivers every published event synchronously to the
// subscribers of its topic, in subscription order, and also records it so
// `World::step` can return the step's events in its `StepResult`. The core
// never depends on any subscriber existing. Subscriptions are explicit:
// `subscribe` hands back a `SubscriptionId`, `unsubscribe` ends it.
//
// See also: `sim.rs` which owns the bus and publishes most events,
// `agent.rs` for `StateChanged`.
//
// **Critical constraint: determinism.** Subscribers live in a `BTreeMap`
// keyed by sequential `SubscriptionId`, so delivery order is stable.

use crate::recovery::RecoveryOutcome;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An event emitted by the simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    /// Step counter at which the event was published.
    pub tick: u64,
    pub kind: SimEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimEventKind {
    AgentSpawned { agent: AgentId, position: WorldPos },
    AgentRemoved { agent: AgentId },
    /// The agent's behavior state changed; `name` is the new state's name.
    StateChanged { agent: AgentId, name: String },
    MinuteChanged { total_minutes: u64, hour: u32 },
    JobClaimed { agent: AgentId, job: JobId },
    JobCompleted { agent: AgentId, job: JobId },
    JobCancelled { agent: Option<AgentId>, job: JobId },
    AgentStuck { agent: AgentId, position: WorldPos },
    RecoveryPlanned { agent: AgentId, outcome: RecoveryOutcome },
    AgentRelocated { agent: AgentId, from: WorldPos, to: WorldPos },
    /// Pushed up out of a freshly placed rung.
    AgentDisplaced { agent: AgentId, from: WorldPos, to: WorldPos },
    StructureStarted { structure: StructureId, kind: StructureKind },
    StructureBuilt { structure: StructureId, connection: ConnectionId },
    StructureExpired { structure: StructureId },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventTopic {
    Lifecycle,
    StateChanged,
    Time,
    Job,
    Recovery,
    Structure,
}

impl SimEventKind {
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::AgentSpawned { .. } | Self::AgentRemoved { .. } => EventTopic::Lifecycle,
            Self::StateChanged { .. } => EventTopic::StateChanged,
            Self::MinuteChanged { .. } => EventTopic::Time,
            Self::JobClaimed { .. } | Self::JobCompleted { .. } | Self::JobCancelled { .. } => {
                EventTopic::Job
            }
            Self::AgentStuck { .. }
            | Self::RecoveryPlanned { .. }
            | Self::AgentRelocated { .. }
            | Self::AgentDisplaced { .. } => EventTopic::Recovery,
            Self::StructureStarted { .. }
            | Self::StructureBuilt { .. }
            | Self::StructureExpired { .. } => EventTopic::Structure,
        }
    }
}

pub type EventHandler = Box<dyn FnMut(&SimEvent)>;

struct Subscription {
    topic: EventTopic,
    handler: EventHandler,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: u64,
    /// Events published since the last `drain`.
    log: Vec<SimEvent>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .field("pending", &self.log.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        topic: EventTopic,
        handler: impl FnMut(&SimEvent) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                topic,
                handler: Box::new(handler),
            },
        );
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Deliver to this topic's subscribers and record for the step result.
    pub fn publish(&mut self, tick: u64, kind: SimEventKind) {
        let event = SimEvent { tick, kind };
        let topic = event.kind.topic();
        for sub in self.subscriptions.values_mut() {
            if sub.topic == topic {
                (sub.handler)(&event);
            }
        }
        self.log.push(event);
    }

    /// Take every event recorded since the last drain.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.log)
    }
}
