use super::{ContextualInstance, InstanceLifecycle};
use crate::bean::{BeanDeclaration, BeanId};
use crate::error::{CdiError, Result};
use crate::lifecycle::DestructionReport;
use anyhow::anyhow;
use dashmap::DashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

enum SlotState {
    Empty,
    Creating {
        owner: ThreadId,
        early: Option<Arc<ContextualInstance>>,
    },
    Ready,
}

/// At most one instance of one bean.
struct Slot {
    ready: OnceLock<Arc<ContextualInstance>>,
    state: Mutex<SlotState>,
    changed: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            ready: OnceLock::new(),
            state: Mutex::new(SlotState::Empty),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self) {
        *self.lock() = SlotState::Empty;
        self.changed.notify_all();
    }
}

/// Puts a slot back to `Empty` unless creation completed, unwinding included.
struct CreationGuard<'s> {
    slot: &'s Slot,
    armed: bool,
}

impl<'s> CreationGuard<'s> {
    fn new(slot: &'s Slot) -> Self {
        Self { slot, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.slot.reset();
        }
    }
}

/// Contextual instance storage with at-most-one creation per bean.
///
/// Reads after creation only touch the `DashMap` shard and a `OnceLock`. The
/// first access to a bean takes the slot's lock; concurrent callers wait on it
/// while construction runs without holding it. The creating thread itself sees
/// the instance as soon as it is constructed, so post-construct callbacks that
/// reach back into the context get the same instance.
#[derive(Default)]
pub struct InstanceStore {
    slots: DashMap<BeanId, Arc<Slot>>,
    order: Mutex<Vec<BeanId>>,
}

impl InstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        bean: &Arc<BeanDeclaration>,
        lifecycle: &dyn InstanceLifecycle,
    ) -> Result<Arc<ContextualInstance>> {
        let slot = self
            .slots
            .entry(bean.id().clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();
        if let Some(ready) = slot.ready.get() {
            return Ok(ready.clone());
        }

        let current = thread::current().id();
        let mut state = slot.lock();
        loop {
            match &*state {
                SlotState::Ready => {
                    return slot.ready.get().cloned().ok_or_else(|| {
                        CdiError::Internal(format!("slot of {} is ready but empty", bean.id()))
                    });
                }
                SlotState::Creating { owner, early } if *owner == current => {
                    return early.clone().ok_or_else(|| {
                        CdiError::creation(
                            bean.id(),
                            anyhow!("circular construction of {} on the same thread", bean.id()),
                        )
                    });
                }
                SlotState::Creating { .. } => {
                    state = slot.changed.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                SlotState::Empty => break,
            }
        }
        *state = SlotState::Creating {
            owner: current,
            early: None,
        };
        drop(state);

        let guard = CreationGuard::new(&slot);
        let instance = lifecycle.instantiate(bean)?;
        if let SlotState::Creating { early, .. } = &mut *slot.lock() {
            *early = Some(instance.clone());
        }

        if let Err(e) = lifecycle.post_construct(&instance) {
            drop(guard);
            let mut report = DestructionReport::new();
            instance.destroy(&mut report);
            return Err(e);
        }

        let _ = slot.ready.set(instance.clone());
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bean.id().clone());
        *slot.lock() = SlotState::Ready;
        slot.changed.notify_all();
        guard.disarm();
        tracing::debug!("Created contextual instance of {}", bean.id());
        Ok(instance)
    }

    pub fn get(&self, bean: &str) -> Option<Arc<ContextualInstance>> {
        self.slots.get(bean)?.ready.get().cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.ready.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy and forget the instance of one bean.
    pub fn destroy(&self, bean: &str) -> DestructionReport {
        let mut report = DestructionReport::new();
        let Some(ready) = self.remove_ready(bean) else {
            return report;
        };
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id| id.as_ref() != bean);
        ready.destroy(&mut report);
        report
    }

    /// Destroy every instance, newest first.
    pub fn destroy_all(&self) -> DestructionReport {
        let order = std::mem::take(&mut *self.order.lock().unwrap_or_else(PoisonError::into_inner));
        let mut report = DestructionReport::new();
        for bean in order.iter().rev() {
            if let Some(ready) = self.remove_ready(bean) {
                ready.destroy(&mut report);
            }
        }
        report
    }

    fn remove_ready(&self, bean: &str) -> Option<Arc<ContextualInstance>> {
        let slot = self
            .slots
            .remove_if(bean, |_, slot| slot.ready.get().is_some())
            .map(|(_, slot)| slot)?;
        slot.ready.get().cloned()
    }
}
