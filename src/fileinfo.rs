//! The `FileInfo` record: a path paired with its derived time coverage and
//! parsed (non-temporal) attributes.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::GeoDatasetError;

/// A file's derived time coverage and attribute captures. `times` is
/// `(None, None)` for non-temporal datasets, treated as spanning
/// `(-inf, +inf)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub times: (Option<NaiveDateTime>, Option<NaiveDateTime>),
    pub attrs: HashMap<String, String>,
}

impl FileInfo {
    pub fn new(path: PathBuf, times: (Option<NaiveDateTime>, Option<NaiveDateTime>), attrs: HashMap<String, String>) -> Self {
        Self { path, times, attrs }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Merge `other` into `self`: times are overwritten field-by-field
    /// wherever `other` has a value, then attrs are merged with `other`
    /// taking priority over any key already present.
    pub fn update(&mut self, other: &FileInfo) {
        if other.times.0.is_some() {
            self.times.0 = other.times.0;
        }
        if other.times.1.is_some() {
            self.times.1 = other.times.1;
        }
        for (k, v) in &other.attrs {
            self.attrs.insert(k.clone(), v.clone());
        }
    }

    /// Whether `self.times` has non-empty overlap with the half-open
    /// window `[start, end)`. Files with unbounded (`None`) times are
    /// treated as spanning all time.
    pub fn overlaps_window(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        let file_start = self.times.0.unwrap_or(chrono::NaiveDateTime::MIN);
        let file_end = self.times.1.unwrap_or(chrono::NaiveDateTime::MAX);
        file_start < end && start <= file_end
    }

    pub fn to_serializable(&self) -> SerializableFileInfo {
        SerializableFileInfo {
            path: self.path.clone(),
            times: [self.times.0.map(|t| t.and_utc().to_rfc3339()), self.times.1.map(|t| t.and_utc().to_rfc3339())],
            attrs: self.attrs.clone(),
        }
    }

    pub fn from_serializable(s: SerializableFileInfo) -> Result<Self, GeoDatasetError> {
        let parse_time = |s: &Option<String>| -> Result<Option<NaiveDateTime>, GeoDatasetError> {
            match s {
                None => Ok(None),
                Some(v) => chrono::DateTime::parse_from_rfc3339(v)
                    .map(|dt| Some(dt.naive_utc()))
                    .map_err(|e| GeoDatasetError::CacheError { path: PathBuf::new(), msg: e.to_string() }),
            }
        };

        Ok(Self {
            path: s.path,
            times: (parse_time(&s.times[0])?, parse_time(&s.times[1])?),
            attrs: s.attrs,
        })
    }
}

/// On-disk representation of a [`FileInfo`]: `{path, times: [iso|null,
/// iso|null], attrs}`, the info-cache file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableFileInfo {
    pub path: PathBuf,
    pub times: [Option<String>; 2],
    pub attrs: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn update_overrides_times_then_attrs() {
        let mut a = FileInfo::new(
            PathBuf::from("a"),
            (Some(dt(2020, 1, 1)), Some(dt(2020, 1, 2))),
            HashMap::from([("k".to_owned(), "v1".to_owned())]),
        );
        let b = FileInfo::new(PathBuf::from("b"), (Some(dt(2021, 1, 1)), None), HashMap::from([("k".to_owned(), "v2".to_owned())]));

        a.update(&b);
        assert_eq!(a.times.0, Some(dt(2021, 1, 1)));
        assert_eq!(a.times.1, Some(dt(2020, 1, 2)));
        assert_eq!(a.attrs.get("k").unwrap(), "v2");
    }

    #[test]
    fn serializable_roundtrip() {
        let fi = FileInfo::new(PathBuf::from("/data/a.csv"), (Some(dt(2020, 6, 1)), Some(dt(2020, 6, 2))), HashMap::new());
        let s = fi.to_serializable();
        let json = serde_json::to_string(&s).unwrap();
        let back: SerializableFileInfo = serde_json::from_str(&json).unwrap();
        let fi2 = FileInfo::from_serializable(back).unwrap();
        assert_eq!(fi, fi2);
    }

    #[test]
    fn unbounded_times_overlap_everything() {
        let fi = FileInfo::new(PathBuf::from("a"), (None, None), HashMap::new());
        assert!(fi.overlaps_window(dt(1900, 1, 1), dt(2100, 1, 1)));
    }
}
