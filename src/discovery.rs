//! The pruned-walk discovery engine: turns a compiled template plus a time
//! window into a stream of [`FileInfo`] records without stat-ing every file
//! under the base directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;

use crate::error::GeoDatasetError;
use crate::fileinfo::FileInfo;
use crate::interval::IntervalTree;
use crate::template::TemplateMatcher;

/// Calendar-floor granularity for `bundle(Frequency)` output grouping -- a
/// closed enum stand-in for a pandas-style frequency string, since this
/// crate carries no general date-offset parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Frequency {
    fn floor(self, dt: NaiveDateTime) -> NaiveDateTime {
        use crate::template::Coarseness;
        let coarseness = match self {
            Self::Minute => Coarseness::Minute,
            Self::Hour => Coarseness::Hour,
            Self::Day => Coarseness::Day,
            Self::Month => Coarseness::Month,
            Self::Year => Coarseness::Year,
        };
        coarseness.truncate(dt)
    }
}

/// A name -> value(s) attribute filter. A name prefixed with `!` is a
/// blacklist, checked after the fact against captured attrs; otherwise it's
/// a whitelist, which the discovery engine folds into the directory/file
/// regex.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub whitelist: HashMap<String, Vec<String>>,
    pub blacklist: HashMap<String, Vec<String>>,
}

impl Filters {
    pub fn from_map(raw: &HashMap<String, Vec<String>>) -> Self {
        let mut whitelist = HashMap::new();
        let mut blacklist = HashMap::new();
        for (name, values) in raw {
            if let Some(stripped) = name.strip_prefix('!') {
                blacklist.insert(stripped.to_owned(), values.clone());
            } else {
                whitelist.insert(name.clone(), values.clone());
            }
        }
        Self { whitelist, blacklist }
    }

    /// Whether `attrs` survives the blacklist (whitelist is applied earlier,
    /// at directory-pruning and file-accept time, against raw captures).
    fn passes_blacklist(&self, attrs: &HashMap<String, String>) -> bool {
        for (name, values) in &self.blacklist {
            if let Some(v) = attrs.get(name) {
                if values.iter().any(|banned| banned == v) {
                    return false;
                }
            }
        }
        true
    }

    fn passes_whitelist(&self, attrs: &HashMap<String, String>) -> bool {
        for (name, values) in &self.whitelist {
            match attrs.get(name) {
                Some(v) if values.iter().any(|allowed| allowed == v) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Sort / bundle / discovery-order output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ordering {
    #[default]
    Discovery,
    Sorted,
    Bundled(BundleKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    Count(usize),
    Frequency(Frequency),
}

/// A discovery request: the time window, filters and output ordering that
/// parameterize a single search.
pub struct Query<'a> {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub filters: Filters,
    pub ordering: Ordering,
    pub no_files_error: bool,
    pub exclude: &'a IntervalTree<i64, ()>,
}

impl<'a> Query<'a> {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, exclude: &'a IntervalTree<i64, ()>) -> Self {
        Self { start, end, filters: Filters::default(), ordering: Ordering::default(), no_files_error: true, exclude }
    }
}

struct DirCandidate {
    path: PathBuf,
    attrs: HashMap<String, String>,
}

/// Enumerate files matching `matcher` within `[query.start, query.end)`,
/// pruning at each directory level rather than walking the whole tree.
///
/// `get_info` is called once per surviving path to produce its [`FileInfo`]
/// (the caller supplies this so it can consult/populate an [`crate::cache::InfoCache`]
/// and route through a [`crate::handler::HandlerRegistry`]); `base_dir` is the
/// root the template's literal prefix is joined onto.
pub fn discover<F>(
    matcher: &TemplateMatcher,
    base_dir: &Path,
    query: &Query,
    mut get_info: F,
) -> Result<Vec<FileInfo>, GeoDatasetError>
where
    F: FnMut(&Path, HashMap<String, String>) -> Result<FileInfo, GeoDatasetError>,
{
    if query.end < query.start {
        return Err(GeoDatasetError::InvalidTimeRange { msg: "discovery end precedes start".to_owned() });
    }
    // Half-open normalization: treat the window as [start, end) by pulling
    // the upper bound in by one unit before any overlap test.
    let half_open_end = query.end - Duration::microseconds(1);

    if crate::template::is_single_file_template(matcher.template_str()) {
        let full_path = base_dir.join(matcher.template_str());
        if !full_path.exists() {
            return if query.no_files_error {
                Err(GeoDatasetError::no_files(matcher.template_str().to_owned(), Some(query.start.to_string()), Some(query.end.to_string())))
            } else {
                Ok(Vec::new())
            };
        }
        let info = get_info(&full_path, HashMap::new())?;
        let hit = info.overlaps_window(query.start, half_open_end) && !excludes(query.exclude, &info);
        let files = if hit { vec![info] } else { Vec::new() };
        return finish(files, query);
    }

    let dir_start = match matcher.sub_dir_time_resolution {
        Some(res) => subtract_one_unit(query.start, res),
        None => query.start,
    };

    let walk_root = if matcher.base_dir.is_empty() { base_dir.to_path_buf() } else { base_dir.join(&matcher.base_dir) };
    let mut candidates = vec![DirCandidate { path: walk_root, attrs: HashMap::new() }];

    for chunk_idx in 0..matcher.sub_dir_chunk_count() {
        let chunk = matcher.sub_dir_chunk(chunk_idx);
        let mut next = Vec::new();

        if !chunk.has_special_chars() {
            for cand in candidates {
                let path = cand.path.join(chunk.literal_text());
                next.push(DirCandidate { path, attrs: cand.attrs });
            }
            candidates = next;
            continue;
        }

        for cand in &candidates {
            let entries = match std::fs::read_dir(&cand.path) {
                Ok(it) => it,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let file_type = match entry.file_type() {
                    Ok(t) => t,
                    Err(_) => continue,
                };
                if !file_type.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let Some(name_str) = name.to_str() else { continue };
                let Some(caps) = chunk.match_name(name_str) else { continue };

                let mut attrs = cand.attrs.clone();
                attrs.extend(caps);

                if let Some(finest) = chunk.finest_temporal() {
                    if let Ok((cand_start, cand_end)) = crate::template::partial_range_from_attrs(&attrs) {
                        let window_start = finest.truncate(dir_start);
                        let window_end = finest.truncate(half_open_end);
                        if cand_end < window_start || cand_start > window_end {
                            continue;
                        }
                    }
                }

                if !query.filters.passes_whitelist(&attrs) {
                    continue;
                }

                next.push(DirCandidate { path: cand.path.join(&name), attrs });
            }
        }
        candidates = next;
    }

    let mut files = Vec::new();
    for cand in &candidates {
        let entries = match std::fs::read_dir(&cand.path) {
            Ok(it) => it,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let relative = path.strip_prefix(base_dir).unwrap_or(&path);
            let Ok(caps) = matcher.parse(relative) else { continue };

            let mut attrs = cand.attrs.clone();
            attrs.extend(caps);

            if !query.filters.passes_whitelist(&attrs) || !query.filters.passes_blacklist(&attrs) {
                continue;
            }

            let info = get_info(&path, attrs)?;
            if !info.overlaps_window(query.start, half_open_end) {
                continue;
            }
            if excludes(query.exclude, &info) {
                continue;
            }
            files.push(info);
        }
    }

    finish(files, query)
}

fn excludes(exclude: &IntervalTree<i64, ()>, info: &FileInfo) -> bool {
    if exclude.is_empty() {
        return false;
    }
    let (Some(start), Some(end)) = info.times else { return false };
    exclude.overlaps(&crate::interval::Interval::new(start.and_utc().timestamp(), end.and_utc().timestamp()))
}

fn subtract_one_unit(dt: NaiveDateTime, res: crate::template::Coarseness) -> NaiveDateTime {
    use crate::template::Coarseness;
    match res {
        Coarseness::Millisecond => dt - Duration::milliseconds(1),
        Coarseness::Second => dt - Duration::seconds(1),
        Coarseness::Minute => dt - Duration::minutes(1),
        Coarseness::Hour => dt - Duration::hours(1),
        Coarseness::Day => dt - Duration::days(1),
        Coarseness::Month => dt.checked_sub_months(chrono::Months::new(1)).unwrap_or(dt),
        Coarseness::Year => dt.checked_sub_months(chrono::Months::new(12)).unwrap_or(dt),
    }
}

fn finish(mut files: Vec<FileInfo>, query: &Query) -> Result<Vec<FileInfo>, GeoDatasetError> {
    if query.no_files_error && files.is_empty() {
        return Err(GeoDatasetError::no_files("<dataset>".to_owned(), Some(query.start.to_string()), Some(query.end.to_string())));
    }

    match query.ordering {
        Ordering::Discovery => {}
        Ordering::Sorted => files.sort_by_key(start_time_key),
        Ordering::Bundled(_) => files.sort_by_key(start_time_key),
    }

    Ok(files)
}

fn start_time_key(info: &FileInfo) -> i64 {
    info.times.0.map(|t| t.and_utc().timestamp_millis()).unwrap_or(i64::MIN)
}

/// Group an already-ordered file list per the requested [`Ordering`], e.g.
/// into `bundle(N)` or `bundle(Frequency)` groups.
pub fn bundle(files: Vec<FileInfo>, ordering: Ordering) -> Vec<Vec<FileInfo>> {
    match ordering {
        Ordering::Bundled(BundleKind::Count(n)) if n > 0 => files.chunks(n).map(|c| c.to_vec()).collect(),
        Ordering::Bundled(BundleKind::Frequency(freq)) => {
            let grouped = files.into_iter().group_by(|info| freq.floor(info.times.0.unwrap_or(chrono::NaiveDateTime::MIN)));
            (&grouped).into_iter().map(|(_, group)| group.collect()).collect()
        }
        _ => files.into_iter().map(|f| vec![f]).collect(),
    }
}

/// Closest-match lookup: try the direct rendered filename first, then
/// widen the search to `[timestamp - res, timestamp + res]` and pick the
/// containing (else nearest-endpoint) file.
pub fn find_closest<F>(
    matcher: &TemplateMatcher,
    base_dir: &Path,
    timestamp: NaiveDateTime,
    filters: Filters,
    exclude: &IntervalTree<i64, ()>,
    attrs: &HashMap<String, String>,
    mut get_info: F,
) -> Result<Option<FileInfo>, GeoDatasetError>
where
    F: FnMut(&Path, HashMap<String, String>) -> Result<FileInfo, GeoDatasetError>,
{
    if let Ok(rendered) = matcher.render((timestamp, timestamp), attrs) {
        let direct = base_dir.join(&rendered);
        if direct.exists() {
            return Ok(Some(get_info(&direct, HashMap::new())?));
        }
    }

    let res = matcher.sub_dir_time_resolution.unwrap_or(crate::template::Coarseness::Day);
    let window_start = subtract_one_unit(timestamp, res);
    let window_end = res.add_one(timestamp);

    let query = Query { start: window_start, end: window_end, filters, ordering: Ordering::Discovery, no_files_error: false, exclude };
    let candidates = discover(matcher, base_dir, &query, &mut get_info)?;

    if candidates.is_empty() {
        return Ok(None);
    }

    let contains = candidates.iter().find(|info| match info.times {
        (Some(s), Some(e)) => s <= timestamp && timestamp <= e,
        _ => false,
    });
    if let Some(hit) = contains {
        return Ok(Some(hit.clone()));
    }

    let closest = candidates.into_iter().min_by_key(|info| {
        let endpoint = match info.times {
            (Some(s), Some(e)) => {
                let ds = (timestamp - s).num_milliseconds().abs();
                let de = (timestamp - e).num_milliseconds().abs();
                ds.min(de)
            }
            (Some(s), None) => (timestamp - s).num_milliseconds().abs(),
            (None, Some(e)) => (timestamp - e).num_milliseconds().abs(),
            (None, None) => i64::MAX,
        };
        endpoint
    });
    Ok(closest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileinfo::FileInfo;
    use chrono::{Datelike, NaiveDate};
    use std::collections::HashMap as Map;

    fn dt(y: i32, mo: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn single_file_short_circuit_missing_file_no_error() {
        let dir = tempdir::TempDir::new("geodataset-discovery").unwrap();
        let matcher = TemplateMatcher::compile("fixed.csv", &Map::new()).unwrap();
        let exclude: IntervalTree<i64, ()> = IntervalTree::new();
        let query = Query { start: dt(2020, 1, 1), end: dt(2020, 1, 2), filters: Filters::default(), ordering: Ordering::Discovery, no_files_error: false, exclude: &exclude };

        let files = discover(&matcher, dir.path(), &query, |p, _| {
            Ok(FileInfo::new(p.to_path_buf(), (None, None), Map::new()))
        })
        .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn discovers_files_within_window_and_prunes_outside() {
        let dir = tempdir::TempDir::new("geodataset-discovery").unwrap();
        for (y, m, d) in [(2020, 1, 1), (2020, 1, 2), (2021, 6, 1)] {
            let sub = dir.path().join(format!("{y:04}")).join(format!("{m:02}"));
            std::fs::create_dir_all(&sub).unwrap();
            std::fs::write(sub.join(format!("{d:02}.csv")), "x").unwrap();
        }

        let matcher = TemplateMatcher::compile("{year}/{month}/{day}.csv", &Map::new()).unwrap();
        let exclude: IntervalTree<i64, ()> = IntervalTree::new();
        let query = Query { start: dt(2020, 1, 1), end: dt(2020, 1, 3), filters: Filters::default(), ordering: Ordering::Sorted, no_files_error: true, exclude: &exclude };

        let files = discover(&matcher, dir.path(), &query, |path, caps| {
            let range = matcher.to_time_range(&caps).unwrap();
            Ok(FileInfo::new(path.to_path_buf(), (Some(range.0), Some(range.1)), Map::new()))
        })
        .unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.times.0.unwrap().year() == 2020));
    }

    #[test]
    fn empty_result_with_no_files_error_fails() {
        let dir = tempdir::TempDir::new("geodataset-discovery").unwrap();
        let matcher = TemplateMatcher::compile("{year}/{month}/{day}.csv", &Map::new()).unwrap();
        let exclude: IntervalTree<i64, ()> = IntervalTree::new();
        let query = Query { start: dt(2020, 1, 1), end: dt(2020, 1, 2), filters: Filters::default(), ordering: Ordering::Discovery, no_files_error: true, exclude: &exclude };

        let err = discover(&matcher, dir.path(), &query, |path, caps| {
            let range = matcher.to_time_range(&caps).unwrap();
            Ok(FileInfo::new(path.to_path_buf(), (Some(range.0), Some(range.1)), Map::new()))
        })
        .unwrap_err();
        assert!(matches!(err, GeoDatasetError::NoFilesError { .. }));
    }

    #[test]
    fn bundle_by_count_groups_consecutive() {
        let files: Vec<FileInfo> = (0..5)
            .map(|i| FileInfo::new(PathBuf::from(format!("f{i}")), (Some(dt(2020, 1, 1)), Some(dt(2020, 1, 1))), Map::new()))
            .collect();
        let groups = bundle(files, Ordering::Bundled(BundleKind::Count(2)));
        assert_eq!(groups.iter().map(|g| g.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
    }
}
