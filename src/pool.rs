use slotmap::{Key, SlotMap, new_key_type};
use tracing::debug;

use crate::{PoolError, RangeTower};

new_key_type! {
    /// Handle to a tower owned by a [`Pool`].
    pub struct TowerHandle;
}

/// Owns a set of towers and reclaims whatever is still registered when it is
/// dropped.
///
/// A tower can also be released early with [`Pool::destroy`]; the handle is
/// dead afterwards, so a second destroy (or the pool's own teardown) never
/// touches that tower again.
#[derive(Default)]
pub struct Pool {
    towers: SlotMap<TowerHandle, RangeTower>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            towers: SlotMap::with_key(),
        }
    }

    pub(crate) fn insert(&mut self, tower: RangeTower) -> TowerHandle {
        let handle = self.towers.insert(tower);
        debug!(?handle, live = self.towers.len(), "tower registered with pool");
        handle
    }

    pub fn get(&self, handle: TowerHandle) -> Result<&RangeTower, PoolError> {
        self.towers
            .get(handle)
            .ok_or_else(|| missing(handle))
    }

    pub fn get_mut(&mut self, handle: TowerHandle) -> Result<&mut RangeTower, PoolError> {
        self.towers
            .get_mut(handle)
            .ok_or_else(|| missing(handle))
    }

    /// Frees the tower now instead of at pool teardown.
    pub fn destroy(&mut self, handle: TowerHandle) -> Result<(), PoolError> {
        self.take(handle).map(drop)
    }

    /// Unregisters the tower and hands ownership to the caller.
    pub fn take(&mut self, handle: TowerHandle) -> Result<RangeTower, PoolError> {
        let tower = self.towers.remove(handle).ok_or_else(|| missing(handle))?;
        debug!(?handle, live = self.towers.len(), "tower released from pool");
        Ok(tower)
    }

    pub fn len(&self) -> usize {
        self.towers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towers.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = TowerHandle> + '_ {
        self.towers.keys()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if !self.towers.is_empty() {
            debug!(live = self.towers.len(), "pool teardown reclaims towers");
        }
    }
}

fn missing(handle: TowerHandle) -> PoolError {
    if handle.is_null() {
        PoolError::NullHandle
    } else {
        PoolError::ResourceNotAvailable
    }
}
