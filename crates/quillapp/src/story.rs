//! # Story Sampler
//!
//! Surfaces a random page of live notes for review. One [`StoryService`]
//! per process; clones share state.
//!
//! Lifecycle is `Stopped -> Running -> Stopped`:
//!
//! - [`StoryService::start_auto_refresh`] replaces any running timer with a
//!   new one at the configured interval (clamped to 10s..=24h). It needs a
//!   tokio runtime.
//! - [`StoryService::stop_auto_refresh`] cancels it. Idempotent.
//! - [`StoryService::update_refresh_interval`] restarts a running timer
//!   after the interval setting changed.
//!
//! The timer is not tied to any screen. Whoever starts it stops it, and
//! every [`StoryService::add_listener`] needs a matching
//! [`StoryService::remove_listener`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::{QuillError, Result};
use crate::model::{Document, Note};
use crate::settings::SettingsStore;
use crate::store::{HierarchyStore, StorageBackend};

pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Where the sampler reads the document from. `None` means unavailable
/// and yields an empty sample.
pub trait HierarchySource: Send + Sync {
    fn snapshot(&self) -> Option<Document>;
}

impl<B: StorageBackend> HierarchySource for HierarchyStore<B> {
    fn snapshot(&self) -> Option<Document> {
        self.read()
    }
}

/// A note with the display fields of its parents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryNote {
    #[serde(flatten)]
    pub note: Note,
    pub notebook_title: String,
    pub chapter_title: String,
    pub notebook_color: String,
}

pub type ListenerId = u64;
type Listener = Arc<dyn Fn(&[StoryNote]) + Send + Sync>;

/// Uniform shuffle of every live note, truncated to `count`.
pub fn sample_notes<R: Rng + ?Sized>(doc: &Document, count: usize, rng: &mut R) -> Vec<StoryNote> {
    let mut pool: Vec<StoryNote> = doc
        .active_notes()
        .map(|(nb, ch, note)| StoryNote {
            note: note.clone(),
            notebook_title: nb.title.clone(),
            chapter_title: ch.title.clone(),
            notebook_color: nb.color.clone(),
        })
        .collect();
    pool.shuffle(rng);
    pool.truncate(count);
    pool
}

/// Refresh period for an interval setting in hours.
pub fn interval_from_hours(hours: f64) -> Duration {
    if !hours.is_finite() || hours <= 0.0 {
        return MIN_REFRESH_INTERVAL;
    }
    let secs = (hours * 3600.0).min(MAX_REFRESH_INTERVAL.as_secs_f64());
    Duration::from_secs_f64(secs).clamp(MIN_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL)
}

struct Inner {
    source: Arc<dyn HierarchySource>,
    settings: Arc<SettingsStore>,
    listeners: Mutex<BTreeMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
    timer: Mutex<Option<JoinHandle<()>>>,
    active: AtomicBool,
    last_refresh: Mutex<Option<DateTime<Utc>>>,
}

impl Inner {
    fn generate(&self) -> Vec<StoryNote> {
        let Some(doc) = self.source.snapshot() else {
            return Vec::new();
        };
        let count = self.settings.get().revision_pages as usize;
        sample_notes(&doc, count, &mut rand::rng())
    }

    fn refresh(&self) -> Vec<StoryNote> {
        let sample = self.generate();
        *self.last_refresh.lock() = Some(Utc::now());

        let listeners: Vec<(ListenerId, Listener)> = self
            .listeners
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(sample.as_slice()))).is_err() {
                tracing::warn!(listener = id, "story listener panicked");
            }
        }
        tracing::debug!(notes = sample.len(), "stories refreshed");
        sample
    }

    fn cancel_timer(&self) -> bool {
        match self.timer.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct StoryService {
    inner: Arc<Inner>,
}

impl StoryService {
    pub fn new(source: Arc<dyn HierarchySource>, settings: Arc<SettingsStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                settings,
                listeners: Mutex::new(BTreeMap::new()),
                next_listener: AtomicU64::new(1),
                timer: Mutex::new(None),
                active: AtomicBool::new(false),
                last_refresh: Mutex::new(None),
            }),
        }
    }

    /// A fresh sample of at most `revisionPages` notes. Listeners are not
    /// notified.
    pub fn generate_sample(&self) -> Vec<StoryNote> {
        self.inner.generate()
    }

    /// New sample, pushed to every listener. A panicking listener is logged
    /// and skipped.
    pub fn refresh(&self) {
        self.inner.refresh();
    }

    /// Pull-to-refresh: same as [`refresh`](Self::refresh) but also returns
    /// the sample.
    pub fn manual_refresh(&self) -> Vec<StoryNote> {
        self.inner.refresh()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[StoryNote]) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, Arc::new(listener));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn last_refresh_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_refresh.lock()
    }

    /// Interval from the current settings.
    pub fn refresh_interval(&self) -> Duration {
        interval_from_hours(self.inner.settings.get().story_interval)
    }

    pub fn start_auto_refresh(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|_| {
            QuillError::Store("story auto refresh needs a running tokio runtime".to_string())
        })?;
        self.inner.cancel_timer();

        let period = self.refresh_interval();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.active.store(true, Ordering::Release);

        let task = handle.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if !inner.active.load(Ordering::Acquire) {
                    break;
                }
                // Reads retry with blocking sleeps.
                let refresh = tokio::task::spawn_blocking(move || {
                    inner.refresh();
                });
                if let Err(err) = refresh.await {
                    tracing::warn!("story refresh task failed: {}", err);
                }
            }
        });
        *self.inner.timer.lock() = Some(task);
        tracing::info!(interval_secs = period.as_secs(), "story auto refresh started");
        Ok(())
    }

    pub fn stop_auto_refresh(&self) {
        let was_active = self.inner.active.swap(false, Ordering::AcqRel);
        let had_timer = self.inner.cancel_timer();
        if was_active || had_timer {
            tracing::info!("story auto refresh stopped");
        }
    }

    /// Restart the timer with the configured interval if it is running.
    pub fn update_refresh_interval(&self) -> Result<()> {
        if self.is_active() {
            self.start_auto_refresh()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{chapters, notebooks, notes, test_support};
    use crate::retry::RetryPolicy;
    use crate::store::{MemBackend, StoreOptions};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn service_with_notes(n: usize) -> (StoryService, TempDir) {
        let (store, nb, ch, _) = test_support::seeded();
        for i in 1..n {
            notes::create(
                &store,
                &nb,
                &ch,
                notes::NoteDraft {
                    title: format!("Note {}", i),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let dir = TempDir::new().unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path()));
        (StoryService::new(Arc::new(store), settings), dir)
    }

    #[test]
    fn sample_is_bounded_by_pages_and_pool() {
        let (service, _dir) = service_with_notes(3);
        assert_eq!(service.generate_sample().len(), 3);

        let (service, _dir) = service_with_notes(10);
        assert_eq!(service.generate_sample().len(), 5);
    }

    #[test]
    fn sample_carries_parent_titles() {
        let (store, _, _, _) = test_support::seeded();
        let doc = store.load().unwrap();
        let sample = sample_notes(&doc, 10, &mut StdRng::seed_from_u64(7));
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].notebook_title, "Biology");
        assert_eq!(sample[0].chapter_title, "Cells");
        assert!(!sample[0].notebook_color.is_empty());
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let (service, _dir) = service_with_notes(5);
        let mut ids: Vec<String> = service
            .generate_sample()
            .into_iter()
            .map(|s| s.note.id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn interval_is_clamped() {
        assert_eq!(interval_from_hours(0.0), MIN_REFRESH_INTERVAL);
        assert_eq!(interval_from_hours(0.001), MIN_REFRESH_INTERVAL);
        assert_eq!(interval_from_hours(0.5), Duration::from_secs(1800));
        assert_eq!(interval_from_hours(100.0), MAX_REFRESH_INTERVAL);
        assert_eq!(interval_from_hours(f64::NAN), MIN_REFRESH_INTERVAL);
    }

    #[test]
    fn listeners_are_isolated_from_panics() {
        let (service, _dir) = service_with_notes(2);
        let seen = Arc::new(AtomicUsize::new(0));
        service.add_listener(|_| panic!("broken screen"));
        let counter = Arc::clone(&seen);
        let id = service.add_listener(move |sample| {
            counter.fetch_add(sample.len(), Ordering::SeqCst);
        });

        let sample = service.manual_refresh();
        assert_eq!(sample.len(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(service.last_refresh_time().is_some());

        assert!(service.remove_listener(id));
        assert!(!service.remove_listener(id));
        service.refresh();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn start_without_runtime_fails() {
        let (service, _dir) = service_with_notes(1);
        assert!(service.start_auto_refresh().is_err());
        assert!(!service.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_refresh_ticks_until_stopped() {
        let (service, _dir) = service_with_notes(1);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        service.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.start_auto_refresh().unwrap();
        assert!(service.is_active());
        tokio::time::sleep(Duration::from_secs(3600 * 2 + 1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        service.stop_auto_refresh();
        service.stop_auto_refresh();
        assert!(!service.is_active());
        tokio::time::sleep(Duration::from_secs(3600 * 3)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_update_restarts_running_timer() {
        let (service, _dir) = service_with_notes(1);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        service.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        service.update_refresh_interval().unwrap();
        assert!(!service.is_active());

        service.start_auto_refresh().unwrap();
        service.inner.settings.set_story_interval(0.01).unwrap();
        service.update_refresh_interval().unwrap();
        assert_eq!(service.refresh_interval(), Duration::from_secs(36));

        tokio::time::sleep(Duration::from_secs(36 * 3 + 1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        service.stop_auto_refresh();
    }

    #[tokio::test(start_paused = true)]
    async fn retried_reads_run_off_the_runtime_thread() {
        let store = Arc::new(HierarchyStore::with_options(
            MemBackend::new(),
            StoreOptions {
                read_retry: RetryPolicy::new(3, Duration::from_millis(250)),
                ..StoreOptions::immediate()
            },
        ));
        let nb = notebooks::create(&store, notebooks::NotebookDraft::titled("Biology")).unwrap();
        let ch = chapters::create(&store, &nb, chapters::ChapterDraft::titled("Cells")).unwrap();
        notes::create(
            &store,
            &nb,
            &ch,
            notes::NoteDraft {
                title: "Mitosis".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let dir = TempDir::new().unwrap();
        let service = StoryService::new(store.clone(), Arc::new(SettingsStore::new(dir.path())));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        service.add_listener(move |sample| {
            let _ = tx.send(sample.len());
        });

        store.backend().fail_next_reads(2);
        service.start_auto_refresh().unwrap();
        let wall = std::time::Instant::now();
        tokio::time::advance(service.refresh_interval() + Duration::from_millis(1)).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(wall.elapsed() < Duration::from_millis(300));

        assert_eq!(rx.recv().await, Some(1));
        service.stop_auto_refresh();
    }
}
