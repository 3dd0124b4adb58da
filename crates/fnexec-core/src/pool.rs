//! Warm pool of idle execution units.
//!
//! One bounded FIFO queue per enabled language, each behind its own
//! `tokio::sync::Mutex`. The lock is held only while the queue itself is being
//! mutated; container creation and teardown always run outside it, so a cold
//! start for one request never blocks another request from taking a warm unit.
//! Units move in and out of the pool by value, which keeps a leased unit out of
//! every queue until it is explicitly released or discarded.

use crate::errors::ExecutionError;
use crate::language::Language;
use crate::lifecycle::LifecycleManager;
use crate::stats::EngineStats;
use crate::unit::ExecutionUnit;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct WarmPool {
    lifecycle: Arc<LifecycleManager>,
    capacity: usize,
    queues: BTreeMap<Language, Mutex<VecDeque<ExecutionUnit>>>,
    stats: Arc<EngineStats>,
    /// Set by `drain`, cleared by `prewarm`. Released units are destroyed
    /// while the pool is closed.
    closed: AtomicBool,
}

impl WarmPool {
    /// Build an empty pool for every language enabled in the lifecycle
    /// manager's configuration.
    pub fn new(lifecycle: Arc<LifecycleManager>, stats: Arc<EngineStats>) -> Self {
        let config = lifecycle.config();
        let capacity = config.pool.size;
        let queues = config
            .enabled_languages()
            .into_iter()
            .map(|language| (language, Mutex::new(VecDeque::with_capacity(capacity))))
            .collect();
        Self {
            lifecycle,
            capacity,
            queues,
            stats,
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn languages(&self) -> Vec<Language> {
        self.queues.keys().copied().collect()
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn queue(&self, language: Language) -> Result<&Mutex<VecDeque<ExecutionUnit>>, ExecutionError> {
        self.queues
            .get(&language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(language.to_string()))
    }

    /// Lease the longest-idle unit for `language`, creating one on a miss.
    pub async fn acquire(&self, language: Language) -> Result<ExecutionUnit, ExecutionError> {
        let queue = self.queue(language)?;
        let warm = queue.lock().await.pop_front();

        let mut unit = match warm {
            Some(unit) => {
                log::debug!("Using a pre-warmed {} container {}", language, unit.name());
                self.stats.record_warm_hit();
                unit
            }
            None => {
                log::warn!(
                    "No pre-warmed {} container available. Creating a new one.",
                    language
                );
                let mut unit = self.lifecycle.create(language).await?;
                unit.mark_cold_start();
                self.stats.record_cold_start();
                unit
            }
        };
        unit.mark_busy();
        Ok(unit)
    }

    /// Return a healthy unit to the tail of its queue, or destroy it when the
    /// queue is already full or the pool has been drained.
    pub async fn release(&self, mut unit: ExecutionUnit) {
        if !unit.is_live() {
            log::warn!("Refusing to pool terminated container {}", unit.id());
            return;
        }
        let Some(queue) = self.queues.get(&unit.language()) else {
            self.discard(unit).await;
            return;
        };

        let overflow = {
            let mut idle = queue.lock().await;
            if self.is_closed() || idle.len() >= self.capacity {
                Some(unit)
            } else {
                unit.mark_idle();
                log::debug!("Returned {} container {} to the pool", unit.language(), unit.name());
                idle.push_back(unit);
                None
            }
        };

        match overflow {
            Some(unit) => {
                log::debug!(
                    "{} pool is full, destroying container {}",
                    unit.language(),
                    unit.name()
                );
                self.discard(unit).await;
            }
            None => self.stats.record_recycled(),
        }
    }

    /// Destroy a unit that can no longer be trusted.
    pub async fn discard(&self, mut unit: ExecutionUnit) {
        self.lifecycle.destroy(&mut unit).await;
        self.stats.record_destroyed();
    }

    /// Fill every queue to capacity. Any creation failure aborts the whole
    /// pre-warm and tears down what was created so far.
    pub async fn prewarm(&self) -> Result<(), ExecutionError> {
        self.closed.store(false, Ordering::SeqCst);
        for (language, queue) in &self.queues {
            let missing = self.capacity.saturating_sub(queue.lock().await.len());
            for _ in 0..missing {
                let mut unit = match self.lifecycle.create(*language).await {
                    Ok(unit) => unit,
                    Err(e) => {
                        log::error!("Failed to pre-warm {} container: {}", language, e);
                        self.drain().await;
                        return Err(e);
                    }
                };
                unit.mark_idle();

                // Releases may have refilled the queue while this unit was
                // being created.
                let overflow = {
                    let mut idle = queue.lock().await;
                    if idle.len() >= self.capacity {
                        Some(unit)
                    } else {
                        log::info!("Pre-warmed {} container {} created.", language, unit.name());
                        idle.push_back(unit);
                        None
                    }
                };
                if let Some(unit) = overflow {
                    log::debug!("{} pool filled during pre-warm, destroying container {}", language, unit.name());
                    self.discard(unit).await;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Close the pool and destroy every idle unit. Returns how many were torn
    /// down.
    pub async fn drain(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let mut drained = 0;
        for queue in self.queues.values() {
            let units: Vec<ExecutionUnit> = queue.lock().await.drain(..).collect();
            for unit in units {
                self.discard(unit).await;
                drained += 1;
            }
        }
        drained
    }

    pub async fn idle_count(&self, language: Language) -> usize {
        match self.queues.get(&language) {
            Some(queue) => queue.lock().await.len(),
            None => 0,
        }
    }

    /// Ids of idle units for `language`, oldest first.
    pub async fn idle_ids(&self, language: Language) -> Vec<String> {
        match self.queues.get(&language) {
            Some(queue) => queue.lock().await.iter().map(|u| u.id().to_string()).collect(),
            None => Vec::new(),
        }
    }
}
