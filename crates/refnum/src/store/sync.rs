#![allow(dead_code)]

#[allow(unused_imports)]
#[cfg(feature = "parking-lot")]
pub(crate) use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
#[allow(unused_imports)]
#[cfg(not(feature = "parking-lot"))]
pub(crate) use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::StoreError;

// `parking_lot` locks never poison, std locks report poisoning as
// `StoreError::LockPoisoned`.

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    #[cfg(feature = "parking-lot")]
    {
        Ok(mutex.lock())
    }
    #[cfg(not(feature = "parking-lot"))]
    {
        Ok(mutex.lock()?)
    }
}

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    #[cfg(feature = "parking-lot")]
    {
        Ok(lock.read())
    }
    #[cfg(not(feature = "parking-lot"))]
    {
        Ok(lock.read()?)
    }
}

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    #[cfg(feature = "parking-lot")]
    {
        Ok(lock.write())
    }
    #[cfg(not(feature = "parking-lot"))]
    {
        Ok(lock.write()?)
    }
}
