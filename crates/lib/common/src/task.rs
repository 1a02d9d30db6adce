// Copyright (C) 2023 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Worker pool with chainable completion handles.
//!
//! Tasks run on a rayon pool owned by [`TaskPool`]. An [`Async`] completes
//! exactly once; a dependent scheduled with [`Async::then`] runs only after
//! its prerequisite succeeds, and a failed prerequisite fails the dependent
//! without running it. There is no cancellation.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::Error;

#[derive(Clone)]
pub struct TaskPool {
    pool: Arc<ThreadPool>,
}

impl TaskPool {
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            pool: Arc::new(
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap(),
            ),
        }
    }

    pub fn spawn<T, F>(&self, task: F) -> Async<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Error> + Send + 'static,
    {
        let handle = Async::pending();
        let inner = handle.inner.clone();
        self.pool.spawn(move || inner.complete(task()));
        handle
    }

    fn spawn_raw<F: FnOnce() + Send + 'static>(&self, task: F) {
        self.pool.spawn(task);
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self {
            pool: Arc::new(ThreadPoolBuilder::default().build().unwrap()),
        }
    }
}

type Continuation<T> = Box<dyn FnOnce(Result<T, Error>) + Send>;

struct AsyncState<T> {
    status: Option<Result<(), Error>>,
    result: Option<Result<T, Error>>,
    continuation: Option<Continuation<T>>,
}

struct AsyncInner<T> {
    state: Mutex<AsyncState<T>>,
    done: Condvar,
}

impl<T> AsyncInner<T> {
    fn complete(&self, result: Result<T, Error>) {
        let mut state = self.state.lock();
        if state.status.is_some() {
            return;
        }
        state.status = Some(match &result {
            Ok(_) => Ok(()),
            Err(err) => Err(*err),
        });
        if let Some(continuation) = state.continuation.take() {
            drop(state);
            self.done.notify_all();
            continuation(result);
        } else {
            state.result = Some(result);
            drop(state);
            self.done.notify_all();
        }
    }
}

/// Completion handle for a task. The produced value has a single consumer:
/// either one `then` continuation or one `take` call.
pub struct Async<T> {
    inner: Arc<AsyncInner<T>>,
}

impl<T> Clone for Async<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Async<T> {
    fn pending() -> Self {
        Self {
            inner: Arc::new(AsyncInner {
                state: Mutex::new(AsyncState {
                    status: None,
                    result: None,
                    continuation: None,
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub fn ready(value: T) -> Self {
        let handle = Self::pending();
        handle.inner.complete(Ok(value));
        handle
    }

    pub fn failed(error: Error) -> Self {
        let handle = Self::pending();
        handle.inner.complete(Err(error));
        handle
    }

    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().status.is_some()
    }

    pub fn status(&self) -> Option<Result<(), Error>> {
        self.inner.state.lock().status
    }

    /// Block until completion; the produced value stays untouched.
    pub fn wait(&self) -> Result<(), Error> {
        let mut state = self.inner.state.lock();
        while state.status.is_none() {
            self.inner.done.wait(&mut state);
        }
        state.status.unwrap()
    }

    /// Block until completion and consume the produced value.
    pub fn take(&self) -> Result<T, Error> {
        let mut state = self.inner.state.lock();
        while state.status.is_none() {
            self.inner.done.wait(&mut state);
        }
        match state.result.take() {
            Some(result) => result,
            None => Err(Error::InvalidState),
        }
    }

    /// Schedule `task` on `pool` once this handle completes successfully.
    pub fn then<U, F>(&self, pool: &TaskPool, task: F) -> Async<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, Error> + Send + 'static,
    {
        let out = Async::pending();
        let out_inner = out.inner.clone();
        let pool = pool.clone();
        let mut continuation: Option<Continuation<T>> =
            Some(Box::new(move |result| match result {
                Ok(value) => pool.spawn_raw(move || out_inner.complete(task(value))),
                Err(err) => out_inner.complete(Err(err)),
            }));

        let ready = {
            let mut state = self.inner.state.lock();
            if state.status.is_none() {
                if state.continuation.is_some() {
                    return Async::failed(Error::InvalidState);
                }
                state.continuation = continuation.take();
                None
            } else {
                match state.result.take() {
                    Some(result) => Some(result),
                    None => return Async::failed(Error::InvalidState),
                }
            }
        };

        if let Some(result) = ready {
            (continuation.take().unwrap())(result);
        }
        out
    }
}
