//! Generic template-based object pool.
//!
//! A [`ResourcePool`] keeps one entry per registered template. Each entry owns
//! every instance it ever built; an instance is either idle (parked on a LIFO
//! stack, ready for reuse) or active (checked out to a caller through an
//! [`InstanceId`]). Instances are never destroyed while the pool lives.
//!
//! Every checkout bumps the slot's generation, so a handle kept past its
//! release never reaches the next holder of the same slot.

use crate::config::PoolDesc;
use crate::error::{HydrogenError, Result};
use std::collections::{HashMap, HashSet};

/// Lifecycle hooks for anything stored in a [`ResourcePool`].
pub trait PooledWorker {
    /// Called every time the instance is checked out.
    fn on_acquire(&mut self) {}

    /// Return the instance to a quiescent state. Called on release.
    fn reset(&mut self);
}

/// Identifier of a registered pool template.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u32);

impl PoolId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PoolId({})", self.0)
    }
}

/// Handle to a single pooled instance, held by whoever checked it out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId {
    pool: PoolId,
    slot: usize,
    generation: u32,
}

impl InstanceId {
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Checkout count of the slot when this handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}@{}", self.pool, self.slot, self.generation)
    }
}

/// Factory used to build new instances for a template.
pub type PoolFactory<T> = dyn Fn() -> T + Send + Sync;

/// A registered class of interchangeable instances.
pub struct PoolTemplate<T> {
    id: PoolId,
    factory: Box<PoolFactory<T>>,
    desc: PoolDesc,
}

impl<T> PoolTemplate<T> {
    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn desc(&self) -> &PoolDesc {
        &self.desc
    }

    fn build(&self) -> T {
        (self.factory)()
    }
}

/// Snapshot of one template's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub active: usize,
}

struct PoolEntry<T> {
    template: PoolTemplate<T>,
    instances: Vec<T>,
    generations: Vec<u32>,
    idle: Vec<usize>,
    active: HashSet<usize>,
}

impl<T> PoolEntry<T> {
    /// True when `instance` is the current checkout of its slot.
    fn holds(&self, instance: InstanceId) -> bool {
        self.active.contains(&instance.slot)
            && self.generations.get(instance.slot) == Some(&instance.generation)
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.instances.len(),
            idle: self.idle.len(),
            active: self.active.len(),
        }
    }
}

/// Object pool keyed by template id.
pub struct ResourcePool<T> {
    entries: HashMap<PoolId, PoolEntry<T>>,
    next_pool_id: u32,
}

impl<T: PooledWorker> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PooledWorker> ResourcePool<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_pool_id: 0,
        }
    }

    /// Registers a template with the default [`PoolDesc`].
    pub fn register<F>(&mut self, factory: F) -> Result<PoolId>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_with(factory, PoolDesc::default())
    }

    /// Registers a template and builds `desc.prewarm` idle instances.
    pub fn register_with<F>(&mut self, factory: F, desc: PoolDesc) -> Result<PoolId>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        desc.validate()?;

        let id = PoolId(self.next_pool_id);
        self.next_pool_id += 1;

        let template = PoolTemplate {
            id,
            factory: Box::new(factory),
            desc,
        };

        let mut instances = Vec::with_capacity(template.desc.prewarm);
        for _ in 0..template.desc.prewarm {
            let mut instance = template.build();
            instance.reset();
            instances.push(instance);
        }
        // Highest slot on top so the first acquire takes the last one built.
        let idle: Vec<usize> = (0..instances.len()).collect();
        let generations = vec![0; instances.len()];

        log::debug!(
            "Pool {} registered (prewarm: {}, max_instances: {:?})",
            id,
            template.desc.prewarm,
            template.desc.max_instances
        );

        self.entries.insert(
            id,
            PoolEntry {
                template,
                instances,
                generations,
                idle,
                active: HashSet::new(),
            },
        );
        Ok(id)
    }

    /// Checks out an instance, reusing the most recently released one first.
    pub fn acquire(&mut self, pool_id: PoolId) -> Result<InstanceId> {
        let entry = self
            .entries
            .get_mut(&pool_id)
            .ok_or(HydrogenError::UnknownPool(pool_id))?;

        let slot = match entry.idle.pop() {
            Some(slot) => {
                log::debug!("Pool {} reusing idle slot {}", pool_id, slot);
                slot
            }
            None => {
                if let Some(max) = entry.template.desc.max_instances {
                    if entry.instances.len() >= max {
                        return Err(HydrogenError::PoolExhausted {
                            pool: pool_id,
                            capacity: max,
                        });
                    }
                }
                let instance = entry.template.build();
                entry.instances.push(instance);
                entry.generations.push(0);
                let slot = entry.instances.len() - 1;
                log::debug!(
                    "Pool {} grew to {} instances",
                    pool_id,
                    entry.instances.len()
                );
                slot
            }
        };

        let generation = entry.generations[slot].wrapping_add(1);
        entry.generations[slot] = generation;
        entry.instances[slot].on_acquire();
        entry.active.insert(slot);

        Ok(InstanceId {
            pool: pool_id,
            slot,
            generation,
        })
    }

    /// Resets an active instance and parks it idle.
    ///
    /// Releasing an instance that is already idle, or a stale handle whose
    /// slot has since been checked out again, is logged and ignored.
    pub fn release(&mut self, instance: InstanceId) -> Result<()> {
        let entry = self
            .entries
            .get_mut(&instance.pool)
            .ok_or(HydrogenError::UnknownPool(instance.pool))?;

        if instance.slot >= entry.instances.len() {
            return Err(HydrogenError::UnknownInstance(instance));
        }

        if !entry.holds(instance) {
            log::warn!("Ignoring release of idle or stale instance {}", instance);
            return Ok(());
        }

        entry.active.remove(&instance.slot);
        entry.instances[instance.slot].reset();
        entry.idle.push(instance.slot);
        Ok(())
    }

    /// Forcibly releases every active instance of a template.
    ///
    /// Returns the number of instances reclaimed.
    pub fn reclaim_all(&mut self, pool_id: PoolId) -> Result<usize> {
        let entry = self
            .entries
            .get_mut(&pool_id)
            .ok_or(HydrogenError::UnknownPool(pool_id))?;

        let mut reclaimed: Vec<usize> = entry.active.drain().collect();
        reclaimed.sort_unstable();
        for &slot in &reclaimed {
            entry.instances[slot].reset();
            entry.idle.push(slot);
        }

        if !reclaimed.is_empty() {
            log::info!(
                "Pool {} reclaimed {} active instances",
                pool_id,
                reclaimed.len()
            );
        }
        Ok(reclaimed.len())
    }

    /// Shared access to an active instance.
    pub fn get(&self, instance: InstanceId) -> Result<&T> {
        let entry = self
            .entries
            .get(&instance.pool)
            .ok_or(HydrogenError::UnknownPool(instance.pool))?;
        if !entry.holds(instance) {
            return Err(HydrogenError::UnknownInstance(instance));
        }
        Ok(&entry.instances[instance.slot])
    }

    /// Mutable access to an active instance.
    pub fn get_mut(&mut self, instance: InstanceId) -> Result<&mut T> {
        let entry = self
            .entries
            .get_mut(&instance.pool)
            .ok_or(HydrogenError::UnknownPool(instance.pool))?;
        if !entry.holds(instance) {
            return Err(HydrogenError::UnknownInstance(instance));
        }
        Ok(&mut entry.instances[instance.slot])
    }

    pub fn is_active(&self, instance: InstanceId) -> bool {
        self.entries
            .get(&instance.pool)
            .is_some_and(|entry| entry.holds(instance))
    }

    pub fn stats(&self, pool_id: PoolId) -> Result<PoolStats> {
        self.entries
            .get(&pool_id)
            .map(PoolEntry::stats)
            .ok_or(HydrogenError::UnknownPool(pool_id))
    }

    pub fn template(&self, pool_id: PoolId) -> Option<&PoolTemplate<T>> {
        self.entries.get(&pool_id).map(|entry| &entry.template)
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        let mut ids: Vec<PoolId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}
