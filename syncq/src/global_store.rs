//! The global job store.
//!
//! Generally this will not be used directly. However, there could be some use
//! cases for getting a reference to the global store via
//! [`GlobalStore::as_ref`]. It is generally encouraged to use the provided
//! APIs in the library instead.
//!
//! Setting the global store should be done via
//! [`crate::Syncq::set_global_store`].
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{store::JobStore, SyncqError};

/// The global job store.
///
/// If this has been set using [`crate::Syncq::set_global_store`], then it is
/// possible to get a reference to it via [`GlobalStore::as_ref`].
pub struct GlobalStore;

static GLOBAL_STORE: OnceCell<Arc<dyn JobStore + 'static + Sync + Send>> = OnceCell::const_new();

impl GlobalStore {
    /// Sets the global store.
    ///
    /// This should only be called once. If called a second time it will
    /// return [`SyncqError::GlobalStore`].
    ///
    /// Calling this makes it possible to enqueue jobs without maintaining a
    /// reference to the store throughout the codebase and enables the use of
    /// [`crate::job::builder::JobBuilder::enqueue`].
    pub(crate) fn set(store: impl JobStore + Send + Sync + 'static) -> Result<(), SyncqError> {
        GLOBAL_STORE.set(Arc::new(store)).map_err(|err| {
            tracing::error!(%err, "Couldn't set global store {err}");
            SyncqError::GlobalStore
        })?;
        Ok(())
    }

    /// Get a reference to the global store.
    ///
    /// # Example
    ///
    /// Calling [`GlobalStore::as_ref`] before setting the store returns an
    /// error
    ///
    /// ```
    /// use syncq::global_store::GlobalStore;
    /// use syncq::SyncqError;
    ///
    /// let result = GlobalStore::as_ref();
    ///
    /// assert!(matches!(result, Err(SyncqError::GlobalStore)));
    /// ```
    #[doc(hidden)]
    pub fn as_ref() -> Result<&'static (dyn JobStore + Send + Sync), SyncqError> {
        Ok(GLOBAL_STORE
            .get()
            .ok_or(SyncqError::GlobalStore)?
            .as_ref())
    }
}
