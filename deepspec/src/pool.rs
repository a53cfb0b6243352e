//! Bounded worker pool yielding per-file results lazily and in input order.

use crate::error::{ConfigError, Result};
use crate::pipeline::{PlotConfig, process_file, relative_dir};
use crate::types::FileResult;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// Files allowed in flight per worker
const IN_FLIGHT_PER_WORKER: usize = 2;

/// Configuration for the worker pool.
#[derive(clap::Args, Clone, Copy, Debug, Default, PartialEq)]
pub struct PoolConfig {
    /// Number of worker threads (default: available processing units)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,
}

impl PoolConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        match self.workers {
            Some(0) => Err(ConfigError::InvalidWorkers(0)),
            _ => Ok(()),
        }
    }

    /// Resolved worker count.
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }
}

/// Lazy, order-preserving sequence of [`FileResult`]s computed on a worker pool.
///
/// Results come out in the order of the input file list. Up to two files
/// per worker are computed ahead of the consumer. Exhausting or dropping the
/// stream stops queued files from starting and joins every worker thread.
pub struct PlotStream {
    files: Vec<PathBuf>,
    input_root: Arc<PathBuf>,
    config: Arc<PlotConfig>,
    pool: Option<ThreadPool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    sender: Option<Sender<(usize, FileResult)>>,
    receiver: Receiver<(usize, FileResult)>,
    pending: BTreeMap<usize, FileResult>,
    next_submit: usize,
    next_yield: usize,
    max_in_flight: usize,
    cancelled: Arc<AtomicBool>,
}

impl PlotStream {
    /// Validate the configuration, start the pool and queue the first files.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings or files outside
    /// `input_root`, and a pool error if worker threads cannot be spawned.
    /// Nothing is spawned when configuration fails.
    pub fn new(
        files: Vec<PathBuf>,
        input_root: impl Into<PathBuf>,
        config: PlotConfig,
    ) -> Result<Self> {
        let input_root = input_root.into();

        config.validate()?;
        for file in &files {
            relative_dir(file, &input_root)?;
        }

        let workers = config.pool.workers();
        let handles = Arc::new(Mutex::new(Vec::with_capacity(workers)));
        let pool = build_pool(workers, Arc::clone(&handles))?;

        tracing::info!(files = files.len(), workers, "starting plot pool");

        let (sender, receiver) = mpsc::channel();
        let mut stream = Self {
            files,
            input_root: Arc::new(input_root),
            config: Arc::new(config),
            pool: Some(pool),
            handles,
            sender: Some(sender),
            receiver,
            pending: BTreeMap::new(),
            next_submit: 0,
            next_yield: 0,
            max_in_flight: workers * IN_FLIGHT_PER_WORKER,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        stream.fill();

        Ok(stream)
    }

    /// Input files in output order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Worker threads still owned by the stream.
    pub fn live_workers(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Queue files until the in-flight window is full.
    fn fill(&mut self) {
        let Some(pool) = &self.pool else {
            return;
        };

        while self.next_submit < self.files.len()
            && self.next_submit - self.next_yield < self.max_in_flight
        {
            let index = self.next_submit;
            let file = self.files[index].clone();
            let input_root = Arc::clone(&self.input_root);
            let config = Arc::clone(&self.config);
            let cancelled = Arc::clone(&self.cancelled);
            let Some(sender) = self.sender.clone() else {
                return;
            };

            pool.spawn(move || {
                let result = if cancelled.load(Ordering::Acquire) {
                    FileResult::empty(&file)
                } else {
                    catch_unwind(AssertUnwindSafe(|| process_file(&file, &input_root, &config)))
                        .unwrap_or_else(|_| {
                            tracing::warn!(file = %file.display(), "pipeline panicked");
                            FileResult::empty(&file)
                        })
                };
                // receiver gone means the stream was dropped
                let _ = sender.send((index, result));
            });

            self.next_submit += 1;
        }

        if self.next_submit == self.files.len() {
            self.sender = None;
        }
    }

    /// Skip queued files, stop the pool and join its threads.
    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        self.sender = None;

        let Some(pool) = self.pool.take() else {
            return;
        };
        drop(pool);

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        let workers = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }

        tracing::debug!(workers, "plot pool shut down");
    }
}

/// Build a rayon pool whose threads are spawned (and owned) by us.
///
/// Each worker runs under the tracing dispatcher active at build time.
fn build_pool(workers: usize, handles: Arc<Mutex<Vec<JoinHandle<()>>>>) -> Result<ThreadPool> {
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());

    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("deepspec-worker-{index}"))
        .spawn_handler(move |thread| {
            let mut builder = std::thread::Builder::new();
            if let Some(name) = thread.name() {
                builder = builder.name(name.to_owned());
            }
            if let Some(stack_size) = thread.stack_size() {
                builder = builder.stack_size(stack_size);
            }

            let dispatch = dispatch.clone();
            let handle = builder.spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || thread.run());
            })?;

            handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handle);
            Ok(())
        })
        .build()?;

    Ok(pool)
}

impl Iterator for PlotStream {
    type Item = FileResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_yield >= self.files.len() {
            self.shutdown();
            return None;
        }

        let result = loop {
            if let Some(result) = self.pending.remove(&self.next_yield) {
                break result;
            }

            match self.receiver.recv() {
                Ok((index, result)) => {
                    self.pending.insert(index, result);
                }
                Err(_) => {
                    // every sender is gone without this file's result
                    tracing::warn!(file = %self.files[self.next_yield].display(), "result lost");
                    break FileResult::empty(&self.files[self.next_yield]);
                }
            }
        };

        self.next_yield += 1;
        self.fill();

        if self.next_yield == self.files.len() {
            self.shutdown();
        }

        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.files.len() - self.next_yield;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PlotStream {}

impl Drop for PlotStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_wav;
    use crate::chunk::ChunkConfig;
    use crate::error::Error;
    use std::f32::consts::PI;
    use std::path::Path;
    use tempfile::TempDir;

    fn tone(path: &Path, sample_rate: u32, secs: f32) {
        let samples: Vec<f32> = (0..(secs * sample_rate as f32) as usize)
            .map(|i| 0.4 * (2.0 * PI * 660.0 * i as f32 / sample_rate as f32).sin() + 0.02)
            .collect();
        write_wav(path, &samples, sample_rate).unwrap();
    }

    fn config(workers: usize) -> PlotConfig {
        let mut config = PlotConfig::default();
        config.render.size = 24;
        config.pool.workers = Some(workers);
        config
    }

    #[test]
    fn preserves_input_order_with_failures() {
        let input = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..9 {
            let path = input.path().join(format!("file_{i}.wav"));
            if i % 3 == 1 {
                std::fs::write(&path, b"corrupt").unwrap();
            } else {
                // vary length so completion order differs from input order
                tone(&path, 8000, 0.25 + (9 - i) as f32 * 0.2);
            }
            files.push(path);
        }

        let mut config = config(3);
        config.chunk = ChunkConfig::new(Some(0.25), Some(0.25));

        let stream = PlotStream::new(files.clone(), input.path(), config).unwrap();
        assert_eq!(stream.len(), 9);

        let results: Vec<_> = stream.collect();

        assert_eq!(results.len(), 9);
        for (i, (result, file)) in results.iter().zip(&files).enumerate() {
            assert_eq!(result.path(), file.as_path());
            assert_eq!(result.is_empty(), i % 3 == 1, "file {i}");
        }
    }

    #[test]
    fn unreadable_then_valid_file() {
        let input = TempDir::new().unwrap();
        let broken = input.path().join("a.wav");
        let valid = input.path().join("b.wav");
        std::fs::write(&broken, b"").unwrap();
        tone(&valid, 16000, 1.5);

        let mut config = config(2);
        config.chunk = ChunkConfig::new(Some(0.5), Some(0.5));

        let results: Vec<_> = PlotStream::new(vec![broken, valid], input.path(), config)
            .unwrap()
            .collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_empty());
        assert_eq!(results[1].len(), 3);
        assert_eq!(results[1].to_array().unwrap().dim(), (3, 24, 24, 3));
    }

    #[test]
    fn exhaustion_releases_workers() {
        let input = TempDir::new().unwrap();
        let file = input.path().join("clip.wav");
        tone(&file, 8000, 0.5);

        let mut stream = PlotStream::new(vec![file], input.path(), config(4)).unwrap();
        assert_eq!(stream.live_workers(), 4);

        assert!(stream.next().is_some());
        assert_eq!(stream.live_workers(), 0);
        assert!(stream.next().is_none());
    }

    #[test]
    fn abandoning_stream_joins_workers() {
        let input = TempDir::new().unwrap();
        let files: Vec<_> = (0..12)
            .map(|i| {
                let path = input.path().join(format!("{i}.wav"));
                tone(&path, 8000, 1.0);
                path
            })
            .collect();

        let mut stream = PlotStream::new(files, input.path(), config(2)).unwrap();
        let first = stream.next().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(stream.len(), 11);

        drop(stream);
    }

    #[test]
    fn empty_file_list_yields_nothing() {
        let input = TempDir::new().unwrap();

        let mut stream = PlotStream::new(Vec::new(), input.path(), config(1)).unwrap();

        assert_eq!(stream.len(), 0);
        assert!(stream.next().is_none());
        assert_eq!(stream.live_workers(), 0);
    }

    #[test]
    fn rejects_bad_config_before_spawning() {
        let input = TempDir::new().unwrap();
        let mut config = config(2);
        config.chunk = ChunkConfig::new(Some(-1.0), Some(0.5));

        let result = PlotStream::new(Vec::new(), input.path(), config);

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidWindow(_)))
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        let input = TempDir::new().unwrap();

        let result = PlotStream::new(Vec::new(), input.path(), config(0));

        assert!(matches!(result, Err(Error::Config(ConfigError::InvalidWorkers(0)))));
    }

    #[test]
    fn rejects_files_outside_root() {
        let input = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let file = other.path().join("x.wav");

        let result = PlotStream::new(vec![file], input.path(), config(1));

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::OutsideInputRoot { .. }))
        ));
    }

    #[test]
    fn default_workers_match_available_parallelism() {
        let expected = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);

        assert_eq!(PoolConfig::default().workers(), expected);
        assert_eq!(PoolConfig { workers: Some(3) }.workers(), 3);
    }
}
