//! The `Dataset` facade: the user-facing type tying the template engine,
//! info cache, handler registry, discovery engine and dispatcher together.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use chrono::NaiveDateTime;

use crate::cache::InfoCache;
use crate::discovery::{self, Filters, Ordering, Query};
use crate::dispatch::{self, WorkerSettings};
use crate::error::GeoDatasetError;
use crate::fileinfo::FileInfo;
use crate::handler::{HandlerData, HandlerRegistry, ReadOptions, WriteOptions};
use crate::interval::{Interval, IntervalTree};
use crate::template::TemplateMatcher;

/// A function that, given the other dataset and the primary's `FileInfo`,
/// resolves the corresponding file in the other dataset. Defaults to
/// rendering the other dataset's template with the primary's times/attrs.
pub type Linker = dyn Fn(&Dataset, &FileInfo) -> Result<FileInfo, GeoDatasetError> + Send + Sync;

struct Link {
    target: Arc<Dataset>,
    linker: Option<Box<Linker>>,
}

/// A time-partitioned file collection. Read-only after construction
/// except for its info cache, exclusion tree, link table and
/// `writing_complete` flag. Those few fields use `RwLock`/`AtomicBool`
/// rather than `RefCell`/`Cell` so that a `Dataset` is `Sync`: `map`/`imap`/
/// `copy` hand `&Dataset` into rayon-driven worker closures, which requires
/// the whole struct (including its link targets, hence `Arc` rather than
/// `Rc`) to cross thread boundaries.
pub struct Dataset {
    pub name: String,
    base_dir: PathBuf,
    template: TemplateMatcher,
    handlers: HandlerRegistry,
    cache: InfoCache,
    exclude: RwLock<IntervalTree<i64, ()>>,
    worker_settings: WorkerSettings,
    links: RwLock<HashMap<String, Link>>,
    user_placeholders: HashMap<String, String>,
    writing_complete: AtomicBool,
}

impl Dataset {
    pub fn new(name: impl Into<String>, base_dir: impl Into<PathBuf>, template_str: &str) -> Result<Self, GeoDatasetError> {
        Self::with_placeholders(name, base_dir, template_str, HashMap::new())
    }

    pub fn with_placeholders(
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        template_str: &str,
        user_placeholders: HashMap<String, String>,
    ) -> Result<Self, GeoDatasetError> {
        let template = TemplateMatcher::compile(template_str, &user_placeholders)?;
        Ok(Self {
            name: name.into(),
            base_dir: base_dir.into(),
            template,
            handlers: HandlerRegistry::with_defaults(),
            cache: InfoCache::new(),
            exclude: RwLock::new(IntervalTree::new()),
            worker_settings: WorkerSettings::threads(4),
            links: RwLock::new(HashMap::new()),
            user_placeholders,
            writing_complete: AtomicBool::new(false),
        })
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_worker_settings(mut self, settings: WorkerSettings) -> Self {
        self.worker_settings = settings;
        self
    }

    /// Re-derive the template's user placeholders. Named temporal
    /// placeholders are always built in and can't be overridden this way.
    pub fn set_placeholders(&mut self, placeholders: HashMap<String, String>) -> Result<(), GeoDatasetError> {
        self.user_placeholders = placeholders;
        self.template = TemplateMatcher::compile(self.template.template_str(), &self.user_placeholders)?;
        Ok(())
    }

    pub fn exclude(&self) -> std::sync::RwLockReadGuard<'_, IntervalTree<i64, ()>> {
        self.exclude.read().unwrap()
    }

    pub fn set_exclude(&self, windows: impl IntoIterator<Item = (NaiveDateTime, NaiveDateTime)>) {
        let intervals = windows.into_iter().map(|(s, e)| (Interval::new(s.and_utc().timestamp(), e.and_utc().timestamp()), ()));
        *self.exclude.write().unwrap() = IntervalTree::from_intervals(intervals);
    }

    pub fn writing_complete(&self) -> bool {
        self.writing_complete.load(AtomicOrdering::Relaxed)
    }

    pub fn generate_filename(&self, times: (NaiveDateTime, NaiveDateTime), attrs: &HashMap<String, String>) -> Result<PathBuf, GeoDatasetError> {
        let rendered = self.template.render(times, attrs)?;
        Ok(self.base_dir.join(rendered))
    }

    pub fn parse_filename(&self, path: &Path) -> Result<HashMap<String, String>, GeoDatasetError> {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
        self.template.parse(relative)
    }

    fn get_info(&self, path: &Path, attrs: HashMap<String, String>) -> Result<FileInfo, GeoDatasetError> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached);
        }

        let mut times = (None, None);
        if let Ok(range) = self.template.to_time_range(&attrs) {
            times = (Some(range.0), Some(range.1));
        }
        let mut info = FileInfo::new(path.to_path_buf(), times, attrs);

        if let Ok(handler) = self.handlers.for_path(path) {
            info = handler.get_info(info)?;
        }

        self.cache.put(path.to_path_buf(), info.clone());
        Ok(info)
    }

    /// Find all files overlapping `[start, end]`.
    pub fn find(&self, start: NaiveDateTime, end: NaiveDateTime, filters: Filters, ordering: Ordering, no_files_error: bool) -> Result<Vec<FileInfo>, GeoDatasetError> {
        let exclude = self.exclude.read().unwrap();
        let query = Query { start, end, filters, ordering, no_files_error, exclude: &exclude };
        discovery::discover(&self.template, &self.base_dir, &query, |path, attrs| self.get_info(path, attrs))
    }

    pub fn find_closest(&self, timestamp: NaiveDateTime, filters: Filters, attrs: &HashMap<String, String>) -> Result<Option<FileInfo>, GeoDatasetError> {
        let exclude = self.exclude.read().unwrap();
        discovery::find_closest(&self.template, &self.base_dir, timestamp, filters, &exclude, attrs, |path, a| self.get_info(path, a))
    }

    /// `find`'s results, materialized eagerly, sorted, erroring if empty.
    /// Used internally by `copy`/`overlaps_with` and by callers that just
    /// want a file listing rather than `collect`'s read-and-concatenate
    /// behavior below.
    pub fn list_sorted(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<FileInfo>, GeoDatasetError> {
        self.find(start, end, Filters::default(), Ordering::Sorted, true)
    }

    /// Read every file overlapping `[start, end)` and concatenate their
    /// contents (spec.md section 4.8: "materialized, concatenated";
    /// `datasets.py::Dataset.collect`). Files are read in parallel on this
    /// dataset's worker pool; any file whose handler returns no content is
    /// dropped before merging. Concatenation goes through the handler
    /// resolved for the first surviving file's extension, mirroring the
    /// original's `self.handler.data_merger` (a dataset-level handler)
    /// generalized here to this crate's per-extension handler registry.
    pub fn collect(&self, start: NaiveDateTime, end: NaiveDateTime, read_options: &ReadOptions) -> Result<(Vec<FileInfo>, HandlerData), GeoDatasetError> {
        let files = self.list_sorted(start, end)?;
        let results = self.map(files, true, read_options, |_, content| Ok(content.cloned()))?;

        let mut infos = Vec::with_capacity(results.len());
        let mut parts = Vec::with_capacity(results.len());
        for (info, content) in results {
            if let Some(data) = content {
                infos.push(info);
                parts.push(data);
            }
        }
        if infos.is_empty() {
            return Err(GeoDatasetError::no_files(self.name.clone(), Some(start.to_string()), Some(end.to_string())));
        }

        let handler = self.handlers.for_path(&infos[0].path)?;
        let merged = handler.data_merger(parts, read_options)?;
        Ok((infos, merged))
    }

    /// Streaming variant of `collect`: yields `(FileInfo, content)` pairs
    /// one at a time instead of concatenating everything up front, with
    /// one-task-lookahead parallelism via `imap`. Takes `self` behind an
    /// `Arc` for the same reason `imap` does (its background coordinator
    /// thread outlives this call).
    pub fn icollect(self: &Arc<Self>, start: NaiveDateTime, end: NaiveDateTime, read_options: ReadOptions) -> Result<dispatch::ImapIter<HandlerData>, GeoDatasetError> {
        let files = self.list_sorted(start, end)?;
        self.imap(files, true, read_options, |_, content| {
            content.cloned().ok_or_else(|| GeoDatasetError::InternalError("handler returned no content to collect".to_owned()))
        })
    }

    pub fn read(&self, info: &FileInfo, options: &ReadOptions) -> Result<HandlerData, GeoDatasetError> {
        let handler = self.handlers.for_path(&info.path)?;
        let primary = handler.read(info, options)?;

        let links = self.links.read().unwrap();
        if links.is_empty() {
            return Ok(primary);
        }

        let mut parts = vec![primary];
        for link in links.values() {
            let linked_info = match &link.linker {
                Some(f) => f(self, info)?,
                None => {
                    let path = link.target.generate_filename(info.times_or_default(), &info.attrs)?;
                    FileInfo::new(path, info.times, info.attrs.clone())
                }
            };
            let linked_handler = link.target.handlers.for_path(&linked_info.path)?;
            parts.push(linked_handler.read(&linked_info, options)?);
        }
        handler.data_merger(parts, options)
    }

    pub fn write(&self, data: &HandlerData, info: &FileInfo, options: &WriteOptions) -> Result<(), GeoDatasetError> {
        let handler = self.handlers.for_path(&info.path)?;
        handler.write(data, info, options)?;
        self.writing_complete.store(true, AtomicOrdering::Relaxed);
        Ok(())
    }

    /// Copy (or convert) files from this dataset into `destination`.
    /// `transform` runs between read and write for conversion mode; pass
    /// `None` for a byte-for-byte copy when the extensions match.
    pub fn copy(
        &self,
        destination: &Dataset,
        files: Vec<FileInfo>,
        transform: Option<&(dyn Fn(HandlerData) -> Result<HandlerData, GeoDatasetError> + Sync)>,
    ) -> Result<Vec<PathBuf>, GeoDatasetError> {
        if crate::template::is_single_file_template(destination.template.template_str()) && files.len() > 1 {
            return Err(GeoDatasetError::CopyDestinationMismatch {
                msg: "cannot copy multiple source files into a single-file destination dataset".to_owned(),
            });
        }

        let settings = self.worker_settings;
        let outputs = dispatch::map(&settings, files, None, |info, _| {
            let dest_path = destination.generate_filename(info.times_or_default(), &info.attrs)?;
            let data = self.read(info, &ReadOptions::default())?;
            let data = match transform {
                Some(f) => f(data)?,
                None => data,
            };
            let dest_info = FileInfo::new(dest_path.clone(), info.times, info.attrs.clone());
            destination.write(&data, &dest_info, &WriteOptions::default())?;
            Ok(dest_path)
        })?;
        Ok(outputs)
    }

    /// Run `f` over `files` on this dataset's worker pool, optionally
    /// reading each file's content first. Returns `(FileInfo, T)` pairs in
    /// input order; callers that don't need the `FileInfo` back can
    /// `.map(|(_, v)| v)`.
    pub fn map<T, F>(
        &self,
        files: Vec<FileInfo>,
        on_content: bool,
        read_options: &ReadOptions,
        f: F,
    ) -> Result<Vec<(FileInfo, T)>, GeoDatasetError>
    where
        T: Send,
        F: Fn(&FileInfo, Option<&HandlerData>) -> Result<T, GeoDatasetError> + Sync,
    {
        let settings = self.worker_settings;
        let reader = |info: &FileInfo| self.read(info, read_options);
        let content_reader: Option<&(dyn Fn(&FileInfo) -> Result<HandlerData, GeoDatasetError> + Send + Sync)> =
            if on_content { Some(&reader) } else { None };

        let infos = files.clone();
        let values = dispatch::map(&settings, files, content_reader, |info, content| f(info, content))?;
        Ok(infos.into_iter().zip(values).collect())
    }

    /// Sink-writing variant of [`Dataset::map`]: a `Some` return is
    /// rendered against `sink`'s template from the *input* file's
    /// times/attrs and written via `sink`'s handler (reporting `true`); a
    /// `None` return reports `false` without writing.
    pub fn map_to_sink<F>(
        &self,
        files: Vec<FileInfo>,
        on_content: bool,
        read_options: &ReadOptions,
        sink: &Dataset,
        f: F,
    ) -> Result<Vec<(FileInfo, bool)>, GeoDatasetError>
    where
        F: Fn(&FileInfo, Option<&HandlerData>) -> Result<Option<HandlerData>, GeoDatasetError> + Sync,
    {
        let settings = self.worker_settings;
        let reader = |info: &FileInfo| self.read(info, read_options);
        let content_reader: Option<&(dyn Fn(&FileInfo) -> Result<HandlerData, GeoDatasetError> + Send + Sync)> =
            if on_content { Some(&reader) } else { None };

        let render = |info: &FileInfo| sink.generate_filename(info.times_or_default(), &info.attrs);
        let write = |path: &Path, data: &HandlerData| {
            let info = FileInfo::new(path.to_path_buf(), (None, None), HashMap::new());
            sink.write(data, &info, &WriteOptions::default())
        };
        let sink_writer = dispatch::SinkWriter { render: &render, write: &write };

        let infos = files.clone();
        let values = dispatch::map_to_sink(&settings, files, content_reader, &sink_writer, f)?;
        Ok(infos.into_iter().zip(values).collect())
    }

    /// Streaming, one-task-lookahead variant of [`Dataset::map`]. Takes
    /// `self` behind an `Arc` because the returned iterator's background
    /// coordinator thread outlives this call.
    pub fn imap<T, F>(
        self: &Arc<Self>,
        files: Vec<FileInfo>,
        on_content: bool,
        read_options: ReadOptions,
        f: F,
    ) -> Result<dispatch::ImapIter<T>, GeoDatasetError>
    where
        T: Send + 'static,
        F: Fn(&FileInfo, Option<&HandlerData>) -> Result<T, GeoDatasetError> + Send + Sync + 'static,
    {
        let settings = self.worker_settings;
        let content_reader: Option<Arc<dyn Fn(&FileInfo) -> Result<HandlerData, GeoDatasetError> + Send + Sync>> = if on_content {
            let owned = Arc::clone(self);
            Some(Arc::new(move |info: &FileInfo| owned.read(info, &read_options)))
        } else {
            None
        };
        dispatch::imap(&settings, files, content_reader, f)
    }

    /// Files from `self` in `[start-delta, end+delta]` paired with
    /// overlapping secondary files, secondary intervals widened by
    /// `±delta`.
    pub fn overlaps_with(
        &self,
        other: &Dataset,
        start: NaiveDateTime,
        end: NaiveDateTime,
        delta: chrono::Duration,
    ) -> Result<Vec<(FileInfo, Vec<FileInfo>)>, GeoDatasetError> {
        let widened_start = start - delta;
        let widened_end = end + delta;

        let primary_files = self.find(widened_start, widened_end, Filters::default(), Ordering::Sorted, false)?;
        let secondary_files = other.find(widened_start, widened_end, Filters::default(), Ordering::Sorted, false)?;

        let delta_secs = delta.num_seconds();
        // Only files with known coverage can be placed in the interval
        // tree; keep a parallel list so a query hit's insertion index maps
        // straight back to the file it came from.
        let secondary_with_times: Vec<&FileInfo> = secondary_files.iter().filter(|f| f.times.0.is_some() && f.times.1.is_some()).collect();
        let tree: IntervalTree<i64, ()> = IntervalTree::from_intervals(secondary_with_times.iter().map(|f| {
            let (s, e) = (f.times.0.unwrap(), f.times.1.unwrap());
            (Interval::new(s.and_utc().timestamp() - delta_secs, e.and_utc().timestamp() + delta_secs), ())
        }));

        let probes: Vec<crate::interval::Probe<i64>> = primary_files
            .iter()
            .map(|f| match f.times {
                (Some(s), Some(e)) => crate::interval::Probe::Interval(Interval::new(s.and_utc().timestamp(), e.and_utc().timestamp())),
                _ => crate::interval::Probe::Point(0),
            })
            .collect();

        let results = tree.query(&probes);
        Ok(primary_files
            .into_iter()
            .zip(results)
            .map(|(primary, hit_indices)| {
                let mut secondaries: Vec<FileInfo> =
                    hit_indices.into_iter().filter_map(|idx| secondary_with_times.get(idx).map(|f| (*f).clone())).collect();
                secondaries.sort_by_key(|f| f.times.0);
                (primary, secondaries)
            })
            .collect())
    }

    /// Link this dataset to `other`, with cycle detection over the link
    /// graph: linking back into a cycle is rejected rather than left to
    /// recurse forever at read time.
    ///
    /// Only direct self-links and direct two-dataset cycles (`other` is
    /// already linked back to `self`) are detected here: a `Dataset` only
    /// knows the names of its own link targets, not the full link graph, so
    /// arbitrary-length cycle detection would need a graph owner (e.g.
    /// [`DatasetManager`]) this call doesn't have access to.
    pub fn link(&self, other: &Arc<Dataset>, linker: Option<Box<Linker>>) -> Result<(), GeoDatasetError> {
        if self.would_cycle(other) {
            return Err(GeoDatasetError::CycleDetected { dataset: other.name.clone() });
        }
        self.links.write().unwrap().insert(other.name.clone(), Link { target: Arc::clone(other), linker });
        Ok(())
    }

    pub fn dislink(&self, other_name: &str) {
        self.links.write().unwrap().remove(other_name);
    }

    fn would_cycle(&self, other: &Dataset) -> bool {
        other.name == self.name || other.links.read().unwrap().contains_key(&self.name)
    }

    pub fn load_info_cache(&self, path: &Path) {
        self.cache.load(path);
    }

    pub fn save_info_cache(&self, path: &Path) -> Result<(), GeoDatasetError> {
        self.cache.save(path)
    }
}

impl FileInfo {
    /// Times with a permissive fallback to "now" on both ends, used where a
    /// destination filename must be rendered but the source carries no
    /// temporal placeholders (non-temporal datasets).
    fn times_or_default(&self) -> (NaiveDateTime, NaiveDateTime) {
        let fallback = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        (self.times.0.unwrap_or(fallback), self.times.1.unwrap_or(fallback))
    }
}

/// A named collection of datasets, supporting `+=` to register one. A thin
/// `HashMap` wrapper rather than a full mapping-type emulation.
#[derive(Default)]
pub struct DatasetManager {
    datasets: HashMap<String, Arc<Dataset>>,
}

impl DatasetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `dataset`, keyed by its name. Overwrites and returns any
    /// dataset previously registered under the same name.
    pub fn add(&mut self, dataset: Dataset) -> Option<Arc<Dataset>> {
        self.datasets.insert(dataset.name.clone(), Arc::new(dataset))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Dataset>> {
        self.datasets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Dataset>)> {
        self.datasets.iter()
    }
}

impl std::ops::AddAssign<Dataset> for DatasetManager {
    fn add_assign(&mut self, dataset: Dataset) {
        self.add(dataset);
    }
}

/// Joins and aligns data read from multiple datasets over a shared time
/// window by advancing a trailing window end.
///
/// TODO: `select_common_time` is left unimplemented; the alignment rule it
/// should apply (which dataset's cadence the window end tracks when they
/// disagree) hasn't been pinned down.
pub struct DataSlider {
    start: NaiveDateTime,
    end: NaiveDateTime,
    current_end: NaiveDateTime,
}

impl DataSlider {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end, current_end: start }
    }

    pub fn add(&mut self, _source: &Dataset) {
        // Registration point for additional sources; the primary-plus-
        // secondaries iteration itself lives in `move`.
    }

    /// Step through the primary dataset's files, pairing each with the
    /// corresponding window of every other registered source.
    pub fn move_next(&mut self, primary: &Dataset) -> Result<Vec<FileInfo>, GeoDatasetError> {
        let files = primary.find(self.current_end, self.end, Filters::default(), Ordering::Sorted, false)?;
        if let Some(last) = files.last() {
            if let Some(end) = last.times.1 {
                self.current_end = end;
            }
        }
        Ok(files)
    }

    // TODO: implement intersection-of-coverage selection across sources
    // once the cadence-alignment rule above is decided.
    pub fn select_common_time(&self, _data: &HashMap<String, Vec<FileInfo>>) -> Result<(), GeoDatasetError> {
        Err(GeoDatasetError::InternalError("select_common_time is not implemented".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn generate_and_parse_filename_roundtrip() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap();

        let t = dt(2020, 6, 15);
        let path = ds.generate_filename((t, t), &HashMap::new()).unwrap();
        assert_eq!(path, dir.path().join("2020/06/15.csv"));

        let caps = ds.parse_filename(&path).unwrap();
        assert_eq!(caps.get("year").unwrap(), "2020");
    }

    #[test]
    fn find_discovers_written_files() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap();

        for d in [1, 2, 3] {
            let t = dt(2020, 1, d);
            let path = ds.generate_filename((t, t), &HashMap::new()).unwrap();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "x").unwrap();
        }

        let files = ds.list_sorted(dt(2020, 1, 1), dt(2020, 1, 3)).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn collect_reads_and_concatenates_content() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap();

        for (d, body) in [(1, "a"), (2, "b")] {
            let t = dt(2020, 1, d);
            let path = ds.generate_filename((t, t), &HashMap::new()).unwrap();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, body).unwrap();
        }

        let (files, data) = ds.collect(dt(2020, 1, 1), dt(2020, 1, 3), &ReadOptions::default()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(data.0, b"ab");
    }

    #[test]
    fn icollect_streams_content_pairs() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Arc::new(Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap());

        for (d, body) in [(1, "a"), (2, "b"), (3, "c")] {
            let t = dt(2020, 1, d);
            let path = ds.generate_filename((t, t), &HashMap::new()).unwrap();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, body).unwrap();
        }

        let stream = ds.icollect(dt(2020, 1, 1), dt(2020, 1, 4), ReadOptions::default()).unwrap();
        let bodies: Vec<Vec<u8>> = stream.map(|(_, r)| r.unwrap().0).collect();
        assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn linking_same_dataset_is_a_cycle() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Arc::new(Dataset::new("a", dir.path(), "{year}.csv").unwrap());
        let err = ds.link(&ds, None).unwrap_err();
        assert!(matches!(err, GeoDatasetError::CycleDetected { .. }));
    }

    #[test]
    fn two_dataset_cycle_is_rejected() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let a = Arc::new(Dataset::new("a", dir.path(), "{year}.csv").unwrap());
        let b = Arc::new(Dataset::new("b", dir.path(), "{year}.csv").unwrap());
        b.link(&a, None).unwrap();
        let err = a.link(&b, None).unwrap_err();
        assert!(matches!(err, GeoDatasetError::CycleDetected { .. }));
    }

    #[test]
    fn exclude_window_hides_overlapping_files() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap();
        let t1 = dt(2020, 1, 1);
        let path1 = ds.generate_filename((t1, t1), &HashMap::new()).unwrap();
        std::fs::create_dir_all(path1.parent().unwrap()).unwrap();
        std::fs::write(&path1, "x").unwrap();

        ds.set_exclude([(dt(2020, 1, 1), dt(2020, 1, 1))]);
        let files = ds.find(dt(2020, 1, 1), dt(2020, 1, 1), Filters::default(), Ordering::Discovery, false).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn map_preserves_order_and_pairs_file_info() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap();

        let mut files = Vec::new();
        for d in [1, 2, 3] {
            let t = dt(2020, 1, d);
            files.push(FileInfo::new(PathBuf::from(format!("f{d}")), (Some(t), Some(t)), HashMap::new()));
        }

        let results = ds.map(files.clone(), false, &ReadOptions::default(), |info, _| Ok::<_, GeoDatasetError>(info.path.clone())).unwrap();

        assert_eq!(results.len(), 3);
        for (original, (info, value)) in files.iter().zip(results.iter()) {
            assert_eq!(&info.path, &original.path);
            assert_eq!(value, &original.path);
        }
    }

    #[test]
    fn imap_streams_in_input_order() {
        let dir = tempdir::TempDir::new("geodataset-dataset").unwrap();
        let ds = Arc::new(Dataset::new("test", dir.path(), "{year}/{month}/{day}.csv").unwrap());

        let files: Vec<FileInfo> = (1..=5)
            .map(|d| FileInfo::new(PathBuf::from(format!("f{d}")), (Some(dt(2020, 1, d)), Some(dt(2020, 1, d))), HashMap::new()))
            .collect();

        let stream = ds.imap(files.clone(), false, ReadOptions::default(), |info, _| Ok::<_, GeoDatasetError>(info.path.to_string_lossy().to_string())).unwrap();

        let collected: Vec<String> = stream.map(|(_, r)| r.unwrap()).collect();
        let expected: Vec<String> = files.iter().map(|f| f.path.to_string_lossy().to_string()).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn map_to_sink_writes_rendered_destination() {
        let src_dir = tempdir::TempDir::new("geodataset-src").unwrap();
        let dst_dir = tempdir::TempDir::new("geodataset-dst").unwrap();
        let src = Dataset::new("src", src_dir.path(), "{year}/{month}/{day}.csv").unwrap();
        let sink = Dataset::new("sink", dst_dir.path(), "{year}-{month}-{day}.csv").unwrap();

        let t = dt(2020, 6, 15);
        let info = FileInfo::new(PathBuf::from("irrelevant"), (Some(t), Some(t)), HashMap::new());

        let results = src
            .map_to_sink(vec![info], false, &ReadOptions::default(), &sink, |_, _| Ok(Some(HandlerData(b"hello".to_vec()))))
            .unwrap();

        assert_eq!(results, vec![(FileInfo::new(PathBuf::from("irrelevant"), (Some(t), Some(t)), HashMap::new()), true)]);
        let written = dst_dir.path().join("2020-06-15.csv");
        assert_eq!(std::fs::read(written).unwrap(), b"hello");
    }
}
