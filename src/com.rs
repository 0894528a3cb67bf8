//! COM initialisation guard.

use crate::error::Result;
use std::marker::PhantomData;
use tracing::debug;
use windows::Win32::System::Com::{
    CoInitializeEx, CoUninitialize, COINIT, COINIT_APARTMENTTHREADED, COINIT_MULTITHREADED,
    COINIT_SPEED_OVER_MEMORY,
};

/// COM apartment to join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadingModel {
    /// Single-threaded apartment.
    #[default]
    SingleThreaded,
    /// Multithreaded apartment.
    MultiThreaded,
}

impl ThreadingModel {
    fn flags(self) -> COINIT {
        let apartment = match self {
            ThreadingModel::SingleThreaded => COINIT_APARTMENTTHREADED,
            ThreadingModel::MultiThreaded => COINIT_MULTITHREADED,
        };
        apartment | COINIT_SPEED_OVER_MEMORY
    }
}

/// Keeps COM initialised on the current thread until dropped.
///
/// Guards nest: initialising an already initialised thread with the same
/// model succeeds and is balanced by its own `CoUninitialize`. Asking for a
/// different model fails with `RPC_E_CHANGED_MODE`.
///
/// The guard is tied to the thread that created it and is neither `Send`
/// nor `Sync`.
#[derive(Debug)]
pub struct ComInitializer {
    model: ThreadingModel,
    _thread_bound: PhantomData<*const ()>,
}

impl ComInitializer {
    /// Initialises COM on this thread with `model`.
    pub fn new(model: ThreadingModel) -> Result<Self> {
        // SAFETY: The reserved parameter must be null. A successful call is
        // balanced by CoUninitialize in Drop.
        unsafe { CoInitializeEx(None, model.flags()) }.ok()?;
        debug!(?model, "COM initialised");
        Ok(Self {
            model,
            _thread_bound: PhantomData,
        })
    }

    /// The apartment this guard joined.
    pub fn model(&self) -> ThreadingModel {
        self.model
    }
}

impl Drop for ComInitializer {
    fn drop(&mut self) {
        // SAFETY: Paired with the successful CoInitializeEx in new, on the
        // same thread since the guard cannot leave it.
        unsafe { CoUninitialize() };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// `RPC_E_CHANGED_MODE`
    const CHANGED_MODE: i32 = 0x8001_0106_u32 as i32;

    #[test]
    fn test_guards_nest() {
        thread::spawn(|| {
            let outer = ComInitializer::new(ThreadingModel::MultiThreaded).unwrap();
            let inner = ComInitializer::new(ThreadingModel::MultiThreaded).unwrap();
            assert_eq!(inner.model(), outer.model());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_changing_model_fails() {
        thread::spawn(|| {
            let _sta = ComInitializer::new(ThreadingModel::SingleThreaded).unwrap();
            let err = ComInitializer::new(ThreadingModel::MultiThreaded).unwrap_err();
            match err {
                crate::error::Error::Windows(e) => assert_eq!(e.code().0, CHANGED_MODE),
                other => panic!("unexpected error: {other}"),
            }
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_reinitialise_after_drop() {
        thread::spawn(|| {
            drop(ComInitializer::new(ThreadingModel::SingleThreaded).unwrap());
            ComInitializer::new(ThreadingModel::MultiThreaded).unwrap();
        })
        .join()
        .unwrap();
    }
}
