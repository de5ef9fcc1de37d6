//! Path template engine: compiles a mixed placeholder/regex/glob template
//! into a [`TemplateMatcher`], renders filenames from a time coverage and
//! attribute set, and parses filenames back into raw placeholder captures.

use std::collections::HashMap;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;

use crate::error::GeoDatasetError;

/// Characters that make a template (or a literal path) "special" -- i.e.
/// not a plain literal path component. Only `{` and `*` carry translated
/// regex semantics in this implementation (placeholder and non-greedy
/// wildcard respectively); the rest of this set (`[ \ < ( ? ! |`) is
/// recognized only to decide single-file-mode and base-directory extent,
/// since this crate defines no glob semantics for them.
pub const SPECIAL_CHARS: &[char] = &['{', '*', '[', '\\', '<', '(', '?', '!', '|'];

pub fn contains_special_char(s: &str) -> bool {
    s.chars().any(|c| SPECIAL_CHARS.contains(&c))
}

/// Unlike `contains_special_char`, only checks the two characters `compile_segment`
/// actually translates into regex constructs (`{` placeholders, `*` wildcard).
/// The rest of `SPECIAL_CHARS` passes through `compile_segment` as escaped literals,
/// so a rendered filename may legitimately still contain them.
fn contains_unrendered_placeholder(s: &str) -> bool {
    s.contains('{') || s.contains('*')
}

/// A template with none of the special characters is a single-file
/// dataset.
pub fn is_single_file_template(template: &str) -> bool {
    !contains_special_char(template)
}

/// The fixed temporal placeholder kinds, with their (non-`end_`) names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalField {
    Year,
    Year2,
    Month,
    Day,
    Doy,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "year" => Some(Self::Year),
            "year2" => Some(Self::Year2),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            "doy" => Some(Self::Doy),
            "hour" => Some(Self::Hour),
            "minute" => Some(Self::Minute),
            "second" => Some(Self::Second),
            "millisecond" => Some(Self::Millisecond),
            _ => None,
        }
    }

    fn digit_width(self) -> usize {
        match self {
            Self::Year => 4,
            Self::Year2 => 2,
            Self::Month => 2,
            Self::Day => 2,
            Self::Doy => 3,
            Self::Hour => 2,
            Self::Minute => 2,
            Self::Second => 2,
            Self::Millisecond => 3,
        }
    }

    /// The coarseness rung this field lives at on the
    /// millisecond..year ladder.
    fn level(self) -> Coarseness {
        match self {
            Self::Year | Self::Year2 => Coarseness::Year,
            Self::Month => Coarseness::Month,
            Self::Day | Self::Doy => Coarseness::Day,
            Self::Hour => Coarseness::Hour,
            Self::Minute => Coarseness::Minute,
            Self::Second => Coarseness::Second,
            Self::Millisecond => Coarseness::Millisecond,
        }
    }
}

/// The finest-to-coarsest temporal resolution ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Coarseness {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Coarseness {
    fn next(self) -> Option<Coarseness> {
        match self {
            Self::Millisecond => Some(Self::Second),
            Self::Second => Some(Self::Minute),
            Self::Minute => Some(Self::Hour),
            Self::Hour => Some(Self::Day),
            Self::Day => Some(Self::Month),
            Self::Month => Some(Self::Year),
            Self::Year => None,
        }
    }

    /// Advance `dt` by one unit of this resolution, used to fix an
    /// end-before-start condition.
    pub fn add_one(self, dt: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::Millisecond => dt + Duration::milliseconds(1),
            Self::Second => dt + Duration::seconds(1),
            Self::Minute => dt + Duration::minutes(1),
            Self::Hour => dt + Duration::hours(1),
            Self::Day => dt + Duration::days(1),
            Self::Month => dt.checked_add_months(chrono::Months::new(1)).unwrap_or(dt),
            Self::Year => dt.checked_add_months(chrono::Months::new(12)).unwrap_or(dt),
        }
    }

    /// Truncate `dt` down to this resolution, used by the discovery engine
    /// to compare a directory chunk's captured attrs against a pruning
    /// window.
    pub fn truncate(self, dt: NaiveDateTime) -> NaiveDateTime {
        let date = dt.date();
        match self {
            Self::Millisecond => dt,
            Self::Second => NaiveDate::from_ymd_opt(date.year(), date.month(), date.day())
                .unwrap()
                .and_hms_opt(dt.hour(), dt.minute(), dt.second())
                .unwrap(),
            Self::Minute => date.and_hms_opt(dt.hour(), dt.minute(), 0).unwrap(),
            Self::Hour => date.and_hms_opt(dt.hour(), 0, 0).unwrap(),
            Self::Day => date.and_hms_opt(0, 0, 0).unwrap(),
            Self::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            Self::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlaceholderKind {
    Temporal(TemporalField, bool),
    User(String),
}

#[derive(Debug, Clone)]
struct PlaceholderMeta {
    raw_name: String,
    group_name: String,
    kind: PlaceholderKind,
}

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Placeholder(PlaceholderMeta),
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledChunk {
    pattern: String,
    tokens: Vec<Token>,
    placeholders: Vec<PlaceholderMeta>,
    own_regex: Regex,
}

impl CompiledChunk {
    pub fn finest_temporal(&self) -> Option<Coarseness> {
        self.placeholders
            .iter()
            .filter_map(|p| match &p.kind {
                PlaceholderKind::Temporal(f, _) => Some(f.level()),
                PlaceholderKind::User(_) => None,
            })
            .min()
    }

    /// A chunk "contains no special character" when it has no placeholders
    /// and no `*` wildcard.
    pub fn has_special_chars(&self) -> bool {
        !self.placeholders.is_empty() || self.tokens.iter().any(|t| matches!(t, Token::Literal(s) if s == "*"))
    }

    /// Concatenated literal text; only meaningful when `has_special_chars`
    /// is false.
    pub fn literal_text(&self) -> String {
        self.tokens.iter().filter_map(|t| match t { Token::Literal(s) => Some(s.clone()), Token::Placeholder(_) => None }).collect()
    }

    /// Match a single path component (e.g. one directory's name) against
    /// this chunk in isolation, returning its raw placeholder captures.
    pub fn match_name(&self, name: &str) -> Option<HashMap<String, String>> {
        let caps = self.own_regex.captures(name)?;
        let mut result = HashMap::new();
        for meta in &self.placeholders {
            if let Some(m) = caps.name(&meta.group_name) {
                result.insert(meta.raw_name.clone(), m.as_str().to_owned());
            }
        }
        Some(result)
    }
}

fn validate_placeholder_name(name: &str) -> Result<(), GeoDatasetError> {
    let mut chars = name.chars();
    let ok_first = chars.next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false);
    let ok_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() || !ok_first || !ok_rest {
        return Err(GeoDatasetError::PlaceholderRegexError {
            name: name.to_owned(),
            msg: "placeholder names must match [A-Za-z_][A-Za-z0-9_]*".to_owned(),
        });
    }
    Ok(())
}

fn classify_placeholder(
    name: &str,
    user_placeholders: &HashMap<String, String>,
) -> (PlaceholderKind, String) {
    if let Some(stripped) = name.strip_prefix("end_") {
        if let Some(field) = TemporalField::from_name(stripped) {
            let regex = format!(r"\d{{{}}}", field.digit_width());
            return (PlaceholderKind::Temporal(field, true), regex);
        }
    }
    if let Some(field) = TemporalField::from_name(name) {
        let regex = format!(r"\d{{{}}}", field.digit_width());
        return (PlaceholderKind::Temporal(field, false), regex);
    }

    let regex = user_placeholders.get(name).cloned().unwrap_or_else(|| "[^/]*?".to_owned());
    (PlaceholderKind::User(name.to_owned()), regex)
}

fn compile_segment(
    segment: &str,
    occurrence_counts: &mut HashMap<String, u32>,
    user_placeholders: &HashMap<String, String>,
) -> Result<CompiledChunk, GeoDatasetError> {
    let chars: Vec<char> = segment.chars().collect();
    let mut pattern = String::new();
    let mut tokens = Vec::new();
    let mut placeholders = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '{' {
            let rel_end = chars[i + 1..]
                .iter()
                .position(|&c| c == '}')
                .ok_or_else(|| GeoDatasetError::PlaceholderRegexError {
                    name: segment.to_owned(),
                    msg: "unterminated '{' placeholder".to_owned(),
                })?;
            let name: String = chars[i + 1..i + 1 + rel_end].iter().collect();
            validate_placeholder_name(&name)?;
            i += rel_end + 2;

            let (kind, base_regex) = classify_placeholder(&name, user_placeholders);

            let count = occurrence_counts.entry(name.clone()).or_insert(0);
            *count += 1;
            let group_name = if *count == 1 {
                name.clone()
            } else {
                format!("{name}__dup{count}")
            };

            pattern.push_str(&format!("(?P<{group_name}>{base_regex})"));
            let meta = PlaceholderMeta { raw_name: name, group_name, kind };
            placeholders.push(meta.clone());
            tokens.push(Token::Placeholder(meta));
        } else if c == '*' {
            pattern.push_str("[^/]*?");
            tokens.push(Token::Literal("*".to_owned()));
            i += 1;
        } else {
            pattern.push_str(&regex::escape(&c.to_string()));
            tokens.push(Token::Literal(c.to_string()));
            i += 1;
        }
    }

    let own_regex = Regex::new(&format!("^{pattern}$")).map_err(|e| GeoDatasetError::PlaceholderRegexError {
        name: segment.to_owned(),
        msg: e.to_string(),
    })?;

    Ok(CompiledChunk { pattern, tokens, placeholders, own_regex })
}

/// The compiled form of a path template: a regex plus the auxiliary
/// metadata the discovery engine and renderer need.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    template_str: String,
    pub base_dir: String,
    sub_dir_chunks: Vec<CompiledChunk>,
    filename_chunk: CompiledChunk,
    full_regex: Regex,
    /// The finest temporal unit present anywhere in the subdirectory
    /// portion of the template.
    pub sub_dir_time_resolution: Option<Coarseness>,
    /// The unit one rung coarser than the coarsest `end_*` placeholder
    /// present anywhere in the template.
    pub end_superior: Option<Coarseness>,
    all_tokens: Vec<Token>,
}

impl TemplateMatcher {
    pub fn compile(template: &str, user_placeholders: &HashMap<String, String>) -> Result<Self, GeoDatasetError> {
        let segments: Vec<&str> = template.split('/').collect();
        if segments.is_empty() {
            return Err(GeoDatasetError::PlaceholderRegexError { name: template.to_owned(), msg: "empty template".to_owned() });
        }
        let (dir_segments, filename_slice) = segments.split_at(segments.len() - 1);
        let filename_segment = filename_slice[0];

        let mut k = 0;
        while k < dir_segments.len() && !contains_special_char(dir_segments[k]) {
            k += 1;
        }
        let base_dir = dir_segments[..k].join("/");
        let remaining = &dir_segments[k..];

        let mut occurrence_counts = HashMap::new();

        let mut sub_dir_chunks = Vec::new();
        for seg in remaining {
            sub_dir_chunks.push(compile_segment(seg, &mut occurrence_counts, user_placeholders)?);
        }
        let filename_chunk = compile_segment(filename_segment, &mut occurrence_counts, user_placeholders)?;

        let sub_dir_time_resolution = sub_dir_chunks.iter().filter_map(|c| c.finest_temporal()).min();

        let coarsest_end = sub_dir_chunks
            .iter()
            .chain(std::iter::once(&filename_chunk))
            .flat_map(|c| c.placeholders.iter())
            .filter_map(|p| match &p.kind {
                PlaceholderKind::Temporal(f, true) => Some(f.level()),
                _ => None,
            })
            .max();
        let end_superior = coarsest_end.and_then(Coarseness::next);

        let mut parts: Vec<String> = Vec::new();
        if !base_dir.is_empty() {
            parts.push(regex::escape(&base_dir));
        }
        for chunk in &sub_dir_chunks {
            parts.push(chunk.pattern.clone());
        }
        parts.push(filename_chunk.pattern.clone());
        let full_pattern = format!("^{}$", parts.join("/"));
        let full_regex = Regex::new(&full_pattern).map_err(|e| GeoDatasetError::PlaceholderRegexError {
            name: template.to_owned(),
            msg: e.to_string(),
        })?;

        let mut all_tokens: Vec<Token> = Vec::new();
        if !base_dir.is_empty() {
            all_tokens.push(Token::Literal(base_dir.clone()));
        }
        for chunk in &sub_dir_chunks {
            if !all_tokens.is_empty() {
                all_tokens.push(Token::Literal("/".to_owned()));
            }
            all_tokens.extend(chunk.tokens.clone());
        }
        if !all_tokens.is_empty() {
            all_tokens.push(Token::Literal("/".to_owned()));
        }
        all_tokens.extend(filename_chunk.tokens.clone());

        Ok(Self {
            template_str: template.to_owned(),
            base_dir,
            sub_dir_chunks,
            filename_chunk,
            full_regex,
            sub_dir_time_resolution,
            end_superior,
            all_tokens,
        })
    }

    pub fn template_str(&self) -> &str {
        &self.template_str
    }

    pub fn sub_dir_chunk_count(&self) -> usize {
        self.sub_dir_chunks.len()
    }

    pub(crate) fn sub_dir_chunk(&self, idx: usize) -> &CompiledChunk {
        &self.sub_dir_chunks[idx]
    }

    fn all_placeholders(&self) -> impl Iterator<Item = &PlaceholderMeta> {
        self.sub_dir_chunks.iter().flat_map(|c| c.placeholders.iter()).chain(self.filename_chunk.placeholders.iter())
    }

    pub fn has_temporal_placeholders(&self) -> bool {
        self.all_placeholders().any(|p| matches!(p.kind, PlaceholderKind::Temporal(_, _)))
    }

    pub fn user_placeholder_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .all_placeholders()
            .filter_map(|p| match &p.kind {
                PlaceholderKind::User(n) => Some(n.clone()),
                _ => None,
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Render a filename by filling temporal placeholders from `times`
    /// (`times.0` for plain fields, `times.1` for `end_*` fields) and user
    /// placeholders from `attrs`.
    pub fn render(&self, times: (NaiveDateTime, NaiveDateTime), attrs: &HashMap<String, String>) -> Result<String, GeoDatasetError> {
        let mut out = String::new();
        for token in &self.all_tokens {
            match token {
                Token::Literal(s) => out.push_str(s),
                Token::Placeholder(meta) => {
                    let value = match &meta.kind {
                        PlaceholderKind::Temporal(field, is_end) => {
                            let dt = if *is_end { times.1 } else { times.0 };
                            format_temporal_field(*field, dt)
                        }
                        PlaceholderKind::User(name) => attrs
                            .get(name)
                            .cloned()
                            .ok_or_else(|| GeoDatasetError::unknown_placeholder(self.template_str.clone(), name.clone()))?,
                    };
                    out.push_str(&value);
                }
            }
        }

        if contains_unrendered_placeholder(&out) {
            return Err(GeoDatasetError::unfilled_placeholder(self.template_str.clone(), None));
        }
        Ok(out)
    }

    /// Match `path` against the compiled regex and return the raw string
    /// captures, keyed by placeholder name (spec.md section 4.3, `Parse`).
    /// Duplicate occurrences of the same placeholder are checked for
    /// consistency (see DESIGN.md on backreference emulation).
    pub fn parse(&self, path: &Path) -> Result<HashMap<String, String>, GeoDatasetError> {
        let path_str = path.to_string_lossy().replace('\\', "/");
        let caps = self
            .full_regex
            .captures(&path_str)
            .ok_or_else(|| GeoDatasetError::InternalError(format!("path '{path_str}' does not match template '{}'", self.template_str)))?;

        let mut result: HashMap<String, String> = HashMap::new();
        for meta in self.all_placeholders() {
            let Some(m) = caps.name(&meta.group_name) else { continue };
            let value = m.as_str().to_owned();
            match result.get(&meta.raw_name) {
                Some(existing) if existing != &value => {
                    return Err(GeoDatasetError::InternalError(format!(
                        "placeholder '{}' captured inconsistent values '{existing}' and '{value}'",
                        meta.raw_name
                    )));
                }
                Some(_) => {}
                None => {
                    result.insert(meta.raw_name.clone(), value);
                }
            }
        }
        Ok(result)
    }

    /// Build the `(start, end)` time coverage implied by a capture map
    /// (spec.md section 4.3, `ToTimeRange`). Requires at least one
    /// temporal placeholder to have matched.
    pub fn to_time_range(&self, captures: &HashMap<String, String>) -> Result<(NaiveDateTime, NaiveDateTime), GeoDatasetError> {
        let mut start_fields = PartialDateTime::default();
        let mut end_overrides = PartialDateTime::default();

        for meta in self.all_placeholders() {
            let PlaceholderKind::Temporal(field, is_end) = meta.kind else { continue };
            let Some(raw) = captures.get(&meta.raw_name) else { continue };
            let value: i64 = raw.parse().map_err(|_| GeoDatasetError::InvalidTimeRange {
                msg: format!("placeholder '{}' value '{raw}' is not an integer", meta.raw_name),
            })?;
            if is_end {
                end_overrides.set(field, value);
            } else {
                start_fields.set(field, value);
            }
        }

        if start_fields.is_empty() && end_overrides.is_empty() {
            return Err(GeoDatasetError::InvalidTimeRange { msg: "template has no temporal placeholders".to_owned() });
        }

        let mut end_fields = start_fields.clone();
        end_fields.merge(&end_overrides);

        let start_dt = start_fields.to_naive_datetime()?;
        let mut end_dt = end_fields.to_naive_datetime()?;

        if end_dt < start_dt {
            match self.end_superior {
                Some(level) => end_dt = level.add_one(end_dt),
                None => {
                    return Err(GeoDatasetError::InvalidTimeRange {
                        msg: "end time precedes start time and no coarser resolution is available to fix it".to_owned(),
                    })
                }
            }
        }

        Ok((start_dt, end_dt))
    }
}

fn format_temporal_field(field: TemporalField, dt: NaiveDateTime) -> String {
    match field {
        TemporalField::Year => format!("{:04}", dt.year()),
        TemporalField::Year2 => format!("{:02}", dt.year().rem_euclid(100)),
        TemporalField::Month => format!("{:02}", dt.month()),
        TemporalField::Day => format!("{:02}", dt.day()),
        TemporalField::Doy => format!("{:03}", dt.ordinal()),
        TemporalField::Hour => format!("{:02}", dt.hour()),
        TemporalField::Minute => format!("{:02}", dt.minute()),
        TemporalField::Second => format!("{:02}", dt.second()),
        TemporalField::Millisecond => format!("{:03}", dt.timestamp_subsec_millis()),
    }
}

/// A datetime under construction from possibly-partial placeholder
/// captures. Missing lower-order fields default to their minimum value;
/// a missing year is the only unrecoverable gap.
#[derive(Debug, Clone, Default)]
struct PartialDateTime {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    doy: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    millisecond: Option<u32>,
}

impl PartialDateTime {
    fn is_empty(&self) -> bool {
        self.year.is_none()
            && self.month.is_none()
            && self.day.is_none()
            && self.doy.is_none()
            && self.hour.is_none()
            && self.minute.is_none()
            && self.second.is_none()
            && self.millisecond.is_none()
    }

    fn set(&mut self, field: TemporalField, value: i64) {
        match field {
            TemporalField::Year => self.year = Some(value as i32),
            TemporalField::Year2 => {
                let y = if value >= 65 { 1900 + value } else { 2000 + value };
                self.year = Some(y as i32);
            }
            TemporalField::Month => self.month = Some(value as u32),
            TemporalField::Day => self.day = Some(value as u32),
            TemporalField::Doy => self.doy = Some(value as u32),
            TemporalField::Hour => self.hour = Some(value as u32),
            TemporalField::Minute => self.minute = Some(value as u32),
            TemporalField::Second => self.second = Some(value as u32),
            TemporalField::Millisecond => self.millisecond = Some(value as u32),
        }
    }

    fn merge(&mut self, other: &PartialDateTime) {
        if other.year.is_some() {
            self.year = other.year;
        }
        if other.month.is_some() {
            self.month = other.month;
        }
        if other.day.is_some() {
            self.day = other.day;
        }
        if other.doy.is_some() {
            self.doy = other.doy;
        }
        if other.hour.is_some() {
            self.hour = other.hour;
        }
        if other.minute.is_some() {
            self.minute = other.minute;
        }
        if other.second.is_some() {
            self.second = other.second;
        }
        if other.millisecond.is_some() {
            self.millisecond = other.millisecond;
        }
    }

    fn to_naive_datetime(&self) -> Result<NaiveDateTime, GeoDatasetError> {
        let year = self.year.ok_or_else(|| GeoDatasetError::InvalidTimeRange {
            msg: "cannot build a timestamp without a year placeholder".to_owned(),
        })?;

        let date = if let Some(doy) = self.doy {
            NaiveDate::from_yo_opt(year, doy)
        } else {
            NaiveDate::from_ymd_opt(year, self.month.unwrap_or(1), self.day.unwrap_or(1))
        }
        .ok_or_else(|| GeoDatasetError::InvalidTimeRange { msg: format!("invalid date for year {year}") })?;

        date.and_hms_milli_opt(self.hour.unwrap_or(0), self.minute.unwrap_or(0), self.second.unwrap_or(0), self.millisecond.unwrap_or(0))
            .ok_or_else(|| GeoDatasetError::InvalidTimeRange { msg: "invalid time-of-day in placeholder captures".to_owned() })
    }
}

/// Build a best-effort `(start, end)` bound from a free-form map of raw
/// placeholder captures (e.g. attrs accumulated while descending directory
/// chunks). Used by the discovery engine's pruning step, which works with
/// accumulated attrs rather than a single chunk's own placeholder metadata
/// (spec.md section 4.7 step 4). Returns `Err` when no year is present
/// (too little information to prune on), which callers should treat as
/// "accept the candidate unconditionally" rather than a hard failure.
pub(crate) fn partial_range_from_attrs(attrs: &HashMap<String, String>) -> Result<(NaiveDateTime, NaiveDateTime), GeoDatasetError> {
    let mut start_fields = PartialDateTime::default();
    let mut end_overrides = PartialDateTime::default();

    for (name, raw) in attrs {
        let (field, is_end) = if let Some(stripped) = name.strip_prefix("end_") {
            match TemporalField::from_name(stripped) {
                Some(f) => (f, true),
                None => continue,
            }
        } else {
            match TemporalField::from_name(name) {
                Some(f) => (f, false),
                None => continue,
            }
        };
        let Ok(value) = raw.parse::<i64>() else { continue };
        if is_end {
            end_overrides.set(field, value);
        } else {
            start_fields.set(field, value);
        }
    }

    if start_fields.is_empty() && end_overrides.is_empty() {
        return Err(GeoDatasetError::InvalidTimeRange { msg: "no temporal attrs present".to_owned() });
    }

    let mut end_fields = start_fields.clone();
    end_fields.merge(&end_overrides);

    let start_dt = start_fields.to_naive_datetime()?;
    let end_dt = end_fields.to_naive_datetime()?;
    Ok((start_dt, end_dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn single_file_detection() {
        assert!(is_single_file_template("data/fixed/file.nc"));
        assert!(!is_single_file_template("data/{year}/file.nc"));
        assert!(!is_single_file_template("data/*/file.nc"));
    }

    #[test]
    fn s1_render_and_parse_roundtrip() {
        let m = TemplateMatcher::compile("{year}/{month}/{day}/{hour}{minute}{second}.nc", &HashMap::new()).unwrap();
        let t = dt(2017, 1, 1, 0, 0, 0);
        let rendered = m.render((t, t), &HashMap::new()).unwrap();
        assert_eq!(rendered, "2017/01/01/000000.nc");

        let caps = m.parse(Path::new(&rendered)).unwrap();
        assert_eq!(caps.get("year").unwrap(), "2017");
        assert_eq!(caps.get("month").unwrap(), "01");
        assert_eq!(caps.get("day").unwrap(), "01");
        assert_eq!(caps.get("hour").unwrap(), "00");
        assert_eq!(caps.get("minute").unwrap(), "00");
        assert_eq!(caps.get("second").unwrap(), "00");

        let (start, end) = m.to_time_range(&caps).unwrap();
        assert_eq!(start, t);
        assert_eq!(end, t);
    }

    #[test]
    fn s2_year2_threshold() {
        let m = TemplateMatcher::compile("{year2}.bin", &HashMap::new()).unwrap();

        let caps = m.parse(Path::new("64.bin")).unwrap();
        let (start, _) = m.to_time_range(&caps).unwrap();
        assert_eq!(start.year(), 2064);

        let caps = m.parse(Path::new("65.bin")).unwrap();
        let (start, _) = m.to_time_range(&caps).unwrap();
        assert_eq!(start.year(), 1965);
    }

    #[test]
    fn s3_end_superior_advances_by_day() {
        let m = TemplateMatcher::compile("{hour}{minute}-{end_hour}{end_minute}.dat", &HashMap::new()).unwrap();
        let caps = m.parse(Path::new("2330-0015.dat")).unwrap();
        assert_eq!(m.end_superior, Some(Coarseness::Day));

        // No year placeholder present, so to_time_range (which requires a
        // year) can't resolve this on its own; verify end_superior directly
        // and that the raw captures round-trip.
        assert_eq!(caps.get("hour").unwrap(), "23");
        assert_eq!(caps.get("end_hour").unwrap(), "00");
    }

    #[test]
    fn repeated_placeholder_must_be_consistent() {
        let m = TemplateMatcher::compile("{year}/{year}-summary.txt", &HashMap::new()).unwrap();
        let caps = m.parse(Path::new("2020/2020-summary.txt")).unwrap();
        assert_eq!(caps.get("year").unwrap(), "2020");

        let err = m.parse(Path::new("2020/2021-summary.txt"));
        assert!(err.is_err());
    }

    #[test]
    fn unfilled_placeholder_in_render_fails() {
        let m = TemplateMatcher::compile("{year}/*/data.csv", &HashMap::new()).unwrap();
        let t = dt(2020, 1, 1, 0, 0, 0);
        let err = m.render((t, t), &HashMap::new()).unwrap_err();
        assert!(matches!(err, GeoDatasetError::UnfilledPlaceholder { .. }));
    }

    #[test]
    fn render_tolerates_literal_regex_special_chars() {
        let m = TemplateMatcher::compile("data(1)/{year}.csv", &HashMap::new()).unwrap();
        let t = dt(2020, 1, 1, 0, 0, 0);
        let rendered = m.render((t, t), &HashMap::new()).unwrap();
        assert_eq!(rendered, "data(1)/2020.csv");
    }

    #[test]
    fn user_placeholder_default_regex_is_non_greedy() {
        let m = TemplateMatcher::compile("{station}.csv", &HashMap::new()).unwrap();
        let mut attrs = HashMap::new();
        attrs.insert("station".to_owned(), "ABC12".to_owned());
        let t = dt(2020, 1, 1, 0, 0, 0);
        let rendered = m.render((t, t), &attrs).unwrap();
        assert_eq!(rendered, "ABC12.csv");

        let caps = m.parse(Path::new("ABC12.csv")).unwrap();
        assert_eq!(caps.get("station").unwrap(), "ABC12");
    }
}
