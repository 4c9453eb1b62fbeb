use std::sync::{Arc, Mutex};

use mangaba_core::event::EventBus;
use mangaba_core::traits::StatusObserver;
use mangaba_core::types::{ExecutionId, ExecutionStep, FlowEvent, StepStatus};

/// Forwards step transitions to an [`EventBus`] as `StepChanged` events.
///
/// Each snapshot is compared with the previous one and every step that
/// differs is published, so subscribers see one event per transition.
pub struct BusObserver {
    bus: Arc<EventBus>,
    execution_id: ExecutionId,
    previous: Mutex<Vec<ExecutionStep>>,
}

impl BusObserver {
    pub fn new(bus: Arc<EventBus>, execution_id: ExecutionId) -> Self {
        Self {
            bus,
            execution_id,
            previous: Mutex::new(Vec::new()),
        }
    }
}

impl StatusObserver for BusObserver {
    fn on_update(&self, steps: &[ExecutionStep]) {
        let mut previous = self.previous.lock().unwrap_or_else(|e| e.into_inner());
        for (i, step) in steps.iter().enumerate() {
            let changed = match previous.get(i) {
                Some(prev) => prev != step,
                None => step.status != StepStatus::Pending,
            };
            if changed {
                self.bus.publish(FlowEvent::StepChanged {
                    execution_id: self.execution_id.clone(),
                    step: step.clone(),
                });
            }
        }
        *previous = steps.to_vec();
    }
}

/// Fans one update out to several observers, in order.
pub(crate) struct Fanout<'o> {
    pub(crate) observers: Vec<&'o dyn StatusObserver>,
}

impl Fanout<'_> {
    pub(crate) fn notify(&self, steps: &[ExecutionStep]) {
        for observer in &self.observers {
            observer.on_update(steps);
        }
    }
}
