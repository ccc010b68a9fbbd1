//! Bounded-memory segment builder: writes per-column and per-SSTable
//! components with the teacher's temp-path + rename-on-success atomicity
//! (spec.md §4.5), gated by a process-wide buffer limiter and instrumented
//! with named fault-injection hooks instead of bytecode weaving.
//!
//! Grounded on `src/sstable/builder.rs`'s `SstWriter::build` (open
//! `path.tmp`, write, flush, sync, rename) generalized from one big file to
//! many small named component files; fault injection generalizes the
//! teacher's `#[cfg(test)]` test-helper pattern into named callback hooks
//! checked at specific build steps.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

use super::{component_path, write_footer, ComponentType, SegmentError};

/// Process-wide counter of bytes buffered across all concurrent segment
/// builds (spec.md §5's segment-buffer limiter). `reserve` blocks while
/// another build holds enough of the budget that this one can't fit,
/// except when the limiter is completely idle — an oversized single
/// component is then allowed through rather than deadlocking forever.
pub struct SegmentBufferLimiter {
    max_bytes: usize,
    in_use: Mutex<usize>,
    freed: Condvar,
}

impl SegmentBufferLimiter {
    /// Creates a limiter with the given byte budget.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            in_use: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    /// Reserves `bytes`, blocking until enough budget is free (or the
    /// limiter is idle, for oversized single reservations).
    pub fn reserve(&self, bytes: usize) {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        while *in_use > 0 && *in_use + bytes > self.max_bytes {
            in_use = self.freed.wait(in_use).unwrap_or_else(|e| e.into_inner());
        }
        *in_use += bytes;
    }

    /// Releases exactly what a prior `reserve` reserved.
    pub fn release(&self, bytes: usize) {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        *in_use = in_use.saturating_sub(bytes);
        self.freed.notify_all();
    }

    /// Current reserved byte count (invariant: zero when no builds run).
    pub fn in_use(&self) -> usize {
        *self.in_use.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The configured byte budget. A column writer accumulating a segment
    /// in memory compares its own buffered size against this to decide when
    /// to flush the current segment and roll over to the next one (spec.md
    /// §4.5: "when the builder's buffered bytes exceed the limit, the
    /// current segment is flushed and a new segment begins").
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for SegmentBufferLimiter {
    fn default() -> Self {
        Self::new(64 * 1024 * 1024)
    }
}

/// Named fault-injection hooks a test can arm to force a build failure at
/// a specific step, exercising spec.md §4.5's interruption-cleanup path
/// without a real IO fault.
#[derive(Default)]
pub struct FaultInjector {
    armed: Mutex<HashMap<&'static str, bool>>,
}

impl FaultInjector {
    /// A no-op injector; every hook point passes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `hook` to fail the next time it fires.
    pub fn arm(&self, hook: &'static str) {
        self.armed.lock().unwrap_or_else(|e| e.into_inner()).insert(hook, true);
    }

    /// Checks and disarms `hook`, returning an error if it was armed.
    pub fn fire(&self, hook: &'static str) -> Result<(), SegmentError> {
        let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
        if armed.remove(hook).unwrap_or(false) {
            return Err(SegmentError::Injected(hook));
        }
        Ok(())
    }
}

/// Writes one SSTable's worth of segment components, tracking every file
/// created so a failed build can delete its partial output (spec.md
/// §4.5's interruption semantics).
pub struct SegmentBuilder<'a> {
    directory: PathBuf,
    sstable_name: String,
    version: u16,
    segment: u32,
    limiter: &'a SegmentBufferLimiter,
    faults: &'a FaultInjector,
    written: Vec<PathBuf>,
}

impl<'a> SegmentBuilder<'a> {
    /// Creates a builder writing components for `sstable_name` into
    /// `directory` at the crate's current format version, starting at
    /// segment ordinal 0.
    pub fn new(
        directory: impl Into<PathBuf>,
        sstable_name: impl Into<String>,
        limiter: &'a SegmentBufferLimiter,
        faults: &'a FaultInjector,
    ) -> Self {
        Self {
            directory: directory.into(),
            sstable_name: sstable_name.into(),
            version: super::CURRENT_VERSION,
            segment: 0,
            limiter,
            faults,
            written: Vec::new(),
        }
    }

    /// The segment ordinal this builder is currently writing into.
    pub fn segment(&self) -> u32 {
        self.segment
    }

    /// Whether a column writer reporting `buffered_bytes` of in-memory
    /// state has exceeded the builder's buffer budget and should flush its
    /// current segment before accepting more rows.
    pub fn should_flush(&self, buffered_bytes: usize) -> bool {
        buffered_bytes > self.limiter.max_bytes()
    }

    /// Closes out the current segment and rolls over to the next ordinal.
    /// Callers must have already flushed every component for the segment
    /// being closed (typically via [`Self::write_component`] /
    /// [`Self::write_marker`]) before calling this.
    pub fn begin_next_segment(&mut self) {
        self.segment += 1;
    }

    /// Writes a checksummed component: reserves `body.len()` against the
    /// buffer limiter, writes `body` plus a footer to a temp file, syncs,
    /// and renames into place.
    pub fn write_component(
        &mut self,
        column: Option<&str>,
        component: ComponentType,
        body: &[u8],
    ) -> Result<(), SegmentError> {
        self.faults.fire("before_component_write")?;

        self.limiter.reserve(body.len());
        let result = self.write_file(column, component, body, true);
        self.limiter.release(body.len());
        result
    }

    /// Writes an empty presence marker (no footer — spec.md §4.5).
    pub fn write_marker(
        &mut self,
        column: Option<&str>,
        component: ComponentType,
    ) -> Result<(), SegmentError> {
        self.faults.fire("before_marker_write")?;
        self.write_file(column, component, &[], false)
    }

    fn write_file(
        &mut self,
        column: Option<&str>,
        component: ComponentType,
        body: &[u8],
        with_footer: bool,
    ) -> Result<(), SegmentError> {
        let final_path = component_path(
            &self.directory,
            &self.sstable_name,
            self.version,
            self.segment,
            column,
            component,
        );
        let tmp_path = final_path.with_extension("tmp");

        let mut buf = body.to_vec();
        if with_footer {
            write_footer(&mut buf, self.version);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|source| SegmentError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        file.write_all(&buf).map_err(|source| SegmentError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| SegmentError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        drop(file);

        self.faults.fire("before_rename")?;

        fs::rename(&tmp_path, &final_path).map_err(|source| SegmentError::Io {
            path: final_path.clone(),
            source,
        })?;
        self.written.push(final_path);
        Ok(())
    }

    /// Finalizes a successful build, returning every component path
    /// written (used to populate `META`/accounting).
    pub fn finish(self) -> Vec<PathBuf> {
        self.written
    }

    /// Deletes every component written so far — called when a build fails
    /// partway through (spec.md §4.5's interruption cleanup).
    pub fn abort(self) {
        for path in &self.written {
            let _ = fs::remove_file(path);
        }
    }
}

/// Deletes every per-column component for `column` under `directory`,
/// across all known component types and every segment ordinal in
/// `0..segment_count` — used when a column's build fails and no completion
/// marker was ever written, or when a column index is dropped. A build that
/// never rotated past its first segment passes `segment_count = 1`.
pub fn purge_column(
    directory: &Path,
    sstable_name: &str,
    version: u16,
    segment_count: u32,
    column: &str,
) -> Result<(), SegmentError> {
    const PER_COLUMN: &[ComponentType] = &[
        ComponentType::TermsData,
        ComponentType::TermsFooterPointer,
        ComponentType::PostingLists,
        ComponentType::KdTree,
        ComponentType::KdTreePostingLists,
        ComponentType::AnnGraph,
        ComponentType::AnnVectors,
        ComponentType::AnnPq,
        ComponentType::AnnOrdinals,
        ComponentType::Meta,
        ComponentType::ColumnCompletionMarker,
    ];
    for segment in 0..segment_count.max(1) {
        for &component in PER_COLUMN {
            let path = component_path(directory, sstable_name, version, segment, Some(column), component);
            if path.exists() {
                fs::remove_file(&path).map_err(|source| SegmentError::Io { path, source })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_and_renames_a_component() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(1024);
        let faults = FaultInjector::new();
        let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

        builder
            .write_component(Some("email"), ComponentType::TermsData, b"payload")
            .unwrap();
        let written = builder.finish();
        assert_eq!(written.len(), 1);
        assert!(written[0].exists());
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn marker_has_no_footer() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(1024);
        let faults = FaultInjector::new();
        let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

        builder
            .write_marker(Some("email"), ComponentType::ColumnCompletionMarker)
            .unwrap();
        let written = builder.finish();
        assert_eq!(fs::read(&written[0]).unwrap().len(), 0);
    }

    #[test]
    fn abort_deletes_partial_components() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(1024);
        let faults = FaultInjector::new();
        let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

        builder
            .write_component(Some("email"), ComponentType::TermsData, b"payload")
            .unwrap();
        let path = builder.written[0].clone();
        builder.abort();
        assert!(!path.exists());
    }

    #[test]
    fn injected_fault_fails_before_write() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(1024);
        let faults = FaultInjector::new();
        faults.arm("before_component_write");
        let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);

        let err = builder
            .write_component(Some("email"), ComponentType::TermsData, b"payload")
            .unwrap_err();
        assert!(matches!(err, SegmentError::Injected("before_component_write")));
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn limiter_releases_back_to_zero() {
        let limiter = SegmentBufferLimiter::new(10);
        limiter.reserve(10);
        assert_eq!(limiter.in_use(), 10);
        limiter.release(10);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn should_flush_compares_against_limiter_budget() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(100);
        let faults = FaultInjector::new();
        let builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);
        assert!(!builder.should_flush(100));
        assert!(builder.should_flush(101));
    }

    #[test]
    fn begin_next_segment_rotates_component_paths() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(1024);
        let faults = FaultInjector::new();
        let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);
        assert_eq!(builder.segment(), 0);

        builder
            .write_component(Some("v"), ComponentType::TermsData, b"first")
            .unwrap();
        builder.begin_next_segment();
        assert_eq!(builder.segment(), 1);
        builder
            .write_component(Some("v"), ComponentType::TermsData, b"second")
            .unwrap();

        let written = builder.finish();
        assert_eq!(written.len(), 2);
        assert_ne!(written[0], written[1]);
        assert!(written[0].exists());
        assert!(written[1].exists());
    }

    #[test]
    fn purge_column_sweeps_every_segment_ordinal() {
        let dir = tempdir().unwrap();
        let limiter = SegmentBufferLimiter::new(1024);
        let faults = FaultInjector::new();
        let mut builder = SegmentBuilder::new(dir.path(), "sst-1", &limiter, &faults);
        builder
            .write_component(Some("v"), ComponentType::TermsData, b"first")
            .unwrap();
        builder.begin_next_segment();
        builder
            .write_component(Some("v"), ComponentType::TermsData, b"second")
            .unwrap();
        let written = builder.finish();
        assert!(written.iter().all(|p| p.exists()));

        purge_column(dir.path(), "sst-1", 0, 2, "v").unwrap();
        assert!(written.iter().all(|p| !p.exists()));
    }
}
