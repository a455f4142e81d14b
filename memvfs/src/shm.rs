use bytes::BytesMut;

use crate::status::{Result, Status};

/// Number of byte-range lock slots the engine coordinates readers and writers over.
pub const LOCK_SLOTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDirection {
    Acquire,
    Release,
}

/// The shared-memory region table plus the byte-range lock table for one database.
///
/// This is an in-process simulation of cross-process file-range locking: there is no
/// blocking, only `Busy` or success, and regions live for as long as the owning
/// `DatabaseState` does.
#[derive(Debug, Default)]
pub struct SharedMemory {
    regions: Vec<BytesMut>,
    shared: [u32; LOCK_SLOTS],
    exclusive: [u32; LOCK_SLOTS],
}

impl SharedMemory {
    pub fn new() -> Self {
        SharedMemory::default()
    }

    /// Returns the region at `index`, allocating a new zero-filled one of `size` bytes if
    /// `extend` is set and the table currently has exactly `index` regions. Returns `Ok(None)`
    /// without error if `extend` is false and the region doesn't exist yet.
    pub fn map(&mut self, index: usize, size: usize, extend: bool) -> Result<Option<&mut [u8]>> {
        if index < self.regions.len() {
            return Ok(Some(&mut self.regions[index]));
        }
        if !extend {
            return Ok(None);
        }
        if index != self.regions.len() {
            return Err(Status::IoErrWrite);
        }
        self.regions.push(BytesMut::zeroed(size));
        Ok(Some(&mut self.regions[index]))
    }

    pub fn unmap(&self) {}

    pub fn lock(
        &mut self,
        offset: usize,
        len: usize,
        mode: LockMode,
        dir: LockDirection,
    ) -> Result<()> {
        if len == 0 || offset + len > LOCK_SLOTS {
            return Err(Status::IoErrWrite);
        }
        if mode == LockMode::Shared && len != 1 {
            return Err(Status::IoErrWrite);
        }
        let range = offset..offset + len;
        match (mode, dir) {
            (LockMode::Exclusive, LockDirection::Acquire) => {
                if range
                    .clone()
                    .any(|i| self.shared[i] > 0 || self.exclusive[i] > 0)
                {
                    return Err(Status::Busy);
                }
                for i in range {
                    self.exclusive[i] = 1;
                }
                Ok(())
            }
            (LockMode::Shared, LockDirection::Acquire) => {
                if range.clone().any(|i| self.exclusive[i] > 0) {
                    return Err(Status::Busy);
                }
                for i in range {
                    self.shared[i] += 1;
                }
                Ok(())
            }
            (LockMode::Exclusive, LockDirection::Release) => {
                for i in range {
                    debug_assert_eq!(self.shared[i], 0);
                    self.exclusive[i] = 0;
                }
                Ok(())
            }
            (LockMode::Shared, LockDirection::Release) => {
                for i in range {
                    debug_assert_eq!(self.exclusive[i], 0);
                    self.shared[i] = self.shared[i].saturating_sub(1);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_requires_contiguous_extension() {
        let mut shm = SharedMemory::new();
        assert!(shm.map(0, 128, false).unwrap().is_none());
        assert!(shm.map(1, 128, true).is_err());
        shm.map(0, 128, true).unwrap();
        assert!(shm.map(0, 128, false).unwrap().is_some());
    }

    #[test]
    fn exclusive_then_shared_contention() {
        let mut shm = SharedMemory::new();
        shm.lock(0, 1, LockMode::Exclusive, LockDirection::Acquire)
            .unwrap();
        assert!(matches!(
            shm.lock(0, 1, LockMode::Shared, LockDirection::Acquire),
            Err(Status::Busy)
        ));
        shm.lock(0, 1, LockMode::Exclusive, LockDirection::Release)
            .unwrap();
        shm.lock(0, 1, LockMode::Shared, LockDirection::Acquire)
            .unwrap();
        assert!(matches!(
            shm.lock(0, 1, LockMode::Exclusive, LockDirection::Acquire),
            Err(Status::Busy)
        ));
    }

    #[test]
    fn unlock_shared_is_idempotent_once_drained() {
        let mut shm = SharedMemory::new();
        shm.lock(3, 1, LockMode::Shared, LockDirection::Acquire)
            .unwrap();
        shm.lock(3, 1, LockMode::Shared, LockDirection::Release)
            .unwrap();
        shm.lock(3, 1, LockMode::Shared, LockDirection::Release)
            .unwrap();
        assert_eq!(shm.shared[3], 0);
    }

    #[test]
    fn shared_lock_must_span_exactly_one_slot() {
        let mut shm = SharedMemory::new();
        assert!(shm
            .lock(0, 2, LockMode::Shared, LockDirection::Acquire)
            .is_err());
    }

    fn op_strategy() -> impl proptest::strategy::Strategy<Value = (usize, LockMode, LockDirection)> {
        use proptest::prelude::*;
        (
            0..LOCK_SLOTS,
            prop_oneof![Just(LockMode::Shared), Just(LockMode::Exclusive)],
            prop_oneof![Just(LockDirection::Acquire), Just(LockDirection::Release)],
        )
    }

    proptest::proptest! {
        /// Whatever sequence of single-slot shared/exclusive acquire/release calls arrives,
        /// successful or refused, a slot is never left recording both a shared and an
        /// exclusive holder at once.
        #[test]
        fn shared_and_exclusive_never_coexist(ops in proptest::collection::vec(op_strategy(), 0..200)) {
            let mut shm = SharedMemory::new();
            for (slot, mode, dir) in ops {
                let _ = shm.lock(slot, 1, mode, dir);
                for i in 0..LOCK_SLOTS {
                    prop_assert!(shm.shared[i] == 0 || shm.exclusive[i] == 0);
                }
            }
        }
    }
}
