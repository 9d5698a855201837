//! Job table
//!
//! Every running command, foreground or background, holds a [`JobGuard`]
//! for as long as its handler runs. Dropping the guard removes the record
//! and wakes anyone waiting on it, on every exit path including task abort.

use crate::error::{ShellError, ShellResult};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{oneshot, Notify};
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u32);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('%').parse().map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobMode {
    Foreground,
    Background,
    /// Background job torn down with its parent
    Daemon,
}

impl JobMode {
    pub fn is_background(self) -> bool {
        !matches!(self, Self::Foreground)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foreground => "fg",
            Self::Background => "bg",
            Self::Daemon => "daemon",
        }
    }
}

/// What the caller registers
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub name: String,
    pub mode: JobMode,
    pub join: bool,
    /// Reads interactive input; never terminable
    pub interactive: bool,
    /// Job of the session that started this one
    pub parent: Option<JobId>,
}

impl JobSpec {
    pub fn foreground(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: JobMode::Foreground,
            join: false,
            interactive: false,
            parent: None,
        }
    }

    pub fn with_mode(mut self, mode: JobMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn joined(mut self, join: bool) -> Self {
        self.join = join;
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn parent(mut self, parent: Option<JobId>) -> Self {
        self.parent = parent;
        self
    }
}

/// A snapshot of one table entry
#[derive(Clone, Debug)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub mode: JobMode,
    pub join: bool,
    pub interactive: bool,
    pub parent: Option<JobId>,
    pub started: DateTime<Local>,
}

struct Job {
    info: JobInfo,
    handle: Option<AbortHandle>,
}

impl Job {
    fn finished(&self) -> bool {
        self.handle.as_ref().is_some_and(AbortHandle::is_finished)
    }
}

#[derive(Default)]
struct Inner {
    jobs: Mutex<BTreeMap<JobId, Job>>,
    removed: Notify,
}

/// Shared id -> job mapping
#[derive(Clone, Default)]
pub struct JobTable {
    inner: Arc<Inner>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<JobId, Job>> {
        // A panicking job must not take the table down with it.
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record a job under the smallest free id.
    pub fn register(&self, spec: JobSpec) -> JobGuard {
        let mut jobs = self.lock();
        let id = (0..)
            .map(JobId)
            .find(|id| !jobs.contains_key(id))
            .unwrap_or(JobId(u32::MAX));
        tracing::debug!(%id, name = %spec.name, mode = spec.mode.as_str(), "Job registered");
        jobs.insert(
            id,
            Job {
                info: JobInfo {
                    id,
                    name: spec.name,
                    mode: spec.mode,
                    join: spec.join,
                    interactive: spec.interactive,
                    parent: spec.parent,
                    started: Local::now(),
                },
                handle: None,
            },
        );
        JobGuard {
            table: self.clone(),
            id,
            reap_daemons: false,
        }
    }

    /// Run `job` as the task of the record `guard` holds. The task is held
    /// back until its abort handle is attached, so it cannot finish and free
    /// its id before the handle lands on the record.
    pub fn spawn<F>(&self, guard: JobGuard, job: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = guard.id();
        let (start, started) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let _ = started.await;
            job.await
        });
        self.attach(id, task.abort_handle());
        let _ = start.send(());
        task
    }

    /// Whether a task handle has been attached to `id`
    pub fn is_attached(&self, id: JobId) -> bool {
        self.lock().get(&id).is_some_and(|job| job.handle.is_some())
    }

    /// Attach the task handle that `terminate` aborts.
    pub fn attach(&self, id: JobId, handle: AbortHandle) {
        if let Some(job) = self.lock().get_mut(&id) {
            job.handle = Some(handle);
        }
    }

    fn remove(&self, id: JobId) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(%id, "Job removed");
        }
        self.inner.removed.notify_waiters();
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn get(&self, id: JobId) -> Option<JobInfo> {
        self.lock().get(&id).map(|job| job.info.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Live jobs in id order. Finished background entries are pruned first.
    pub fn list(&self) -> Vec<JobInfo> {
        let mut jobs = self.lock();
        jobs.retain(|_, job| !(job.info.mode.is_background() && job.finished()));
        jobs.values().map(|job| job.info.clone()).collect()
    }

    pub fn terminate(&self, id: JobId) -> ShellResult<JobInfo> {
        let jobs = self.lock();
        let job = jobs.get(&id).ok_or(ShellError::JobNotFound(id))?;
        let refuse = |reason| ShellError::JobNotTerminable { id, reason };
        if job.info.interactive {
            return Err(refuse("job is waiting for interactive input"));
        }
        if !job.info.mode.is_background() {
            return Err(refuse("foreground jobs cannot be terminated"));
        }
        let Some(handle) = &job.handle else {
            return Err(refuse("job has not started yet"));
        };
        handle.abort();
        tracing::debug!(%id, "Job terminated");
        Ok(job.info.clone())
    }

    /// Abort daemon jobs, all of them or only those started by `parent`.
    pub fn abort_daemons(&self, parent: Option<JobId>) -> usize {
        let jobs = self.lock();
        let mut aborted = 0;
        for job in jobs.values() {
            let owned = parent.is_none() || job.info.parent == parent;
            if job.info.mode == JobMode::Daemon && owned {
                if let Some(handle) = &job.handle {
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }

    /// Wait until the record of `id` is gone.
    pub async fn wait_removed(&self, id: JobId) {
        self.wait_until(|jobs| !jobs.contains_key(&id)).await;
    }

    /// Wait until no background jobs remain.
    pub async fn wait_background(&self) {
        self.wait_until(|jobs| !jobs.values().any(|job| job.info.mode.is_background()))
            .await;
    }

    async fn wait_until(&self, done: impl Fn(&BTreeMap<JobId, Job>) -> bool) {
        loop {
            let mut notified = pin!(self.inner.removed.notified());
            // Register before checking so a removal in between is not missed
            notified.as_mut().enable();
            let finished = done(&*self.lock());
            if finished {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps a job record alive; removes it on drop.
pub struct JobGuard {
    table: JobTable,
    id: JobId,
    reap_daemons: bool,
}

impl JobGuard {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Also abort the daemon jobs this job started when the record goes.
    pub fn reaping_daemons(mut self) -> Self {
        self.reap_daemons = true;
        self
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if self.reap_daemons {
            let aborted = self.table.abort_daemons(Some(self.id));
            if aborted > 0 {
                tracing::debug!(id = %self.id, aborted, "Daemon jobs torn down with parent");
            }
        }
        self.table.remove(self.id);
    }
}
