// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Memoization shared by the factories.
//!
//! Every name owns one `OnceCell`; the first caller builds the object and any
//! concurrent caller for the same name waits on that cell instead of building a
//! second one. A failed build drops the cell so a later call may retry and an
//! unknown name leaves nothing behind.

use crate::errors::AmqpError;
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::{Mutex, OnceCell};

pub(crate) struct Memo<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
}

impl<T> Memo<T> {
    pub(crate) fn new() -> Memo<T> {
        Memo {
            cells: Mutex::new(HashMap::default()),
        }
    }

    pub(crate) async fn get_or_try_init<F, Fut>(
        &self,
        name: &str,
        init: F,
    ) -> Result<Arc<T>, AmqpError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, AmqpError>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(name.to_owned()).or_default().clone()
        };

        match cell.get_or_try_init(init).await {
            Ok(value) => Ok(value.clone()),
            Err(err) => {
                let mut cells = self.cells.lock().await;
                let unchanged = cells
                    .get(name)
                    .is_some_and(|current| Arc::ptr_eq(current, &cell) && !current.initialized());
                if unchanged {
                    cells.remove(name);
                }
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }
}

/// Observer invoked with the name and the object right after a factory built it.
pub type CreatedCallback<T> = Box<dyn Fn(&str, &Arc<T>) + Send + Sync>;

pub(crate) struct Callbacks<T> {
    callbacks: RwLock<Vec<CreatedCallback<T>>>,
}

impl<T> Callbacks<T> {
    pub(crate) fn new() -> Callbacks<T> {
        Callbacks {
            callbacks: RwLock::new(vec![]),
        }
    }

    pub(crate) fn add(&self, callback: CreatedCallback<T>) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    pub(crate) fn notify(&self, name: &str, created: &Arc<T>) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        for callback in callbacks.iter() {
            callback(name, created);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn builds_once_per_name() {
        let memo = Memo::<String>::new();
        let counter = AtomicUsize::new(0);
        let builds = &counter;

        let build = move || async move {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new("orders".to_owned()))
        };

        let first = memo.get_or_try_init("orders", build).await.unwrap();
        let second = memo.get_or_try_init("orders", build).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce() {
        let memo = Memo::<usize>::new();
        let counter = AtomicUsize::new(0);
        let builds = &counter;

        let build = move || async move {
            tokio::task::yield_now().await;
            Ok(Arc::new(builds.fetch_add(1, Ordering::SeqCst)))
        };

        let (a, b) = tokio::join!(
            memo.get_or_try_init("orders", build),
            memo.get_or_try_init("orders", build)
        );

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_build_is_not_cached() {
        let memo = Memo::<usize>::new();

        let failed = memo
            .get_or_try_init("orders", || async { Err(AmqpError::InternalError) })
            .await;
        assert_eq!(failed.unwrap_err(), AmqpError::InternalError);

        let built = memo
            .get_or_try_init("orders", || async { Ok(Arc::new(7)) })
            .await
            .unwrap();
        assert_eq!(*built, 7);
    }

    #[tokio::test]
    async fn failed_lookup_leaves_no_cell_behind() {
        let memo = Memo::<usize>::new();

        for name in ["a", "b", "c"] {
            let failed = memo
                .get_or_try_init(name, || async {
                    Err(AmqpError::NotFound {
                        name: name.to_owned(),
                        available: vec![],
                    })
                })
                .await;
            assert!(failed.is_err());
        }

        assert_eq!(memo.len().await, 0);

        memo.get_or_try_init("orders", || async { Ok(Arc::new(1)) })
            .await
            .unwrap();
        assert_eq!(memo.len().await, 1);
    }

    #[test]
    fn callbacks_see_every_creation() {
        let callbacks = Callbacks::<usize>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        callbacks.add(Box::new(move |name, value| {
            assert_eq!(name, "orders");
            counter.fetch_add(**value, Ordering::SeqCst);
        }));

        callbacks.notify("orders", &Arc::new(3));
        callbacks.notify("orders", &Arc::new(4));

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }
}
