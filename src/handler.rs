//! The handler contract: the abstract read/write/get_info interface a
//! concrete file-format codec implements, plus a small extension-based
//! registry.
//!
//! Concrete scientific codecs (NetCDF, HDF5, ...) are out of scope;
//! [`CsvHandler`] and [`RawHandler`] here are the plain-text stand-ins
//! that exercise the contract without pulling in a real
//! scientific-format dependency.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::GeoDatasetError;
use crate::fileinfo::FileInfo;

/// Opaque payload handed between `read`/`write` and caller code. The core
/// doesn't interpret the bytes; handlers and callers agree on the shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandlerData(pub Vec<u8>);

impl HandlerData {
    pub fn as_str(&self) -> Result<&str, GeoDatasetError> {
        std::str::from_utf8(&self.0).map_err(|e| GeoDatasetError::InternalError(e.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub append: bool,
}

/// The contract external codec modules implement.
pub trait Handler: Send + Sync {
    fn read(&self, info: &FileInfo, options: &ReadOptions) -> Result<HandlerData, GeoDatasetError>;
    fn write(&self, data: &HandlerData, info: &FileInfo, options: &WriteOptions) -> Result<(), GeoDatasetError>;

    /// May update `info`'s times/attrs from the file's own contents; the
    /// default simply returns `info` unchanged.
    fn get_info(&self, info: FileInfo) -> Result<FileInfo, GeoDatasetError> {
        Ok(info)
    }

    /// Extensions this handler reads/writes natively after a recognized
    /// compression suffix has been stripped.
    fn handled_extensions(&self) -> &[&str];

    /// Merge several reads into one, used when reading linked datasets.
    /// The default concatenates byte buffers in order.
    fn data_merger(&self, parts: Vec<HandlerData>, _options: &ReadOptions) -> Result<HandlerData, GeoDatasetError> {
        let mut out = Vec::new();
        for part in parts {
            out.extend(part.0);
        }
        Ok(HandlerData(out))
    }
}

/// Compression suffixes recognized and stripped before extension-based
/// handler lookup.
pub const COMPRESSION_SUFFIXES: &[&str] = &["gz", "bz2", "zip", "xz"];

fn extension_after_stripping_compression(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_owned();
    if COMPRESSION_SUFFIXES.contains(&ext.as_str()) {
        let stem = path.file_stem()?;
        return Path::new(stem).extension().and_then(|e| e.to_str()).map(|s| s.to_owned());
    }
    Some(ext)
}

/// Maps a filename extension to the handler that reads/writes it.
pub struct HandlerRegistry {
    by_extension: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { by_extension: HashMap::new() }
    }

    /// The crate's default registry: `csv,txt,asc -> CsvHandler`. A
    /// `nc,h5 -> NetCDF` mapping is not registered here since no NetCDF
    /// codec ships with this crate (out of scope); callers with access to
    /// a real scientific-format handler register it themselves.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(CsvHandler));
        reg
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        for ext in handler.handled_extensions() {
            self.by_extension.insert((*ext).to_owned(), Arc::clone(&handler));
        }
    }

    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn Handler>, GeoDatasetError> {
        let ext = extension_after_stripping_compression(path)
            .ok_or_else(|| GeoDatasetError::NoHandlerError { msg: format!("{} has no recognizable extension", path.display()) })?;
        self.by_extension
            .get(&ext)
            .cloned()
            .ok_or_else(|| GeoDatasetError::NoHandlerError { msg: format!("no handler registered for extension '.{ext}'") })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// A minimal CSV handler: `read`/`write` operate on raw bytes, `get_info`
/// is a no-op since this crate has no schema for the file's columns.
pub struct CsvHandler;

impl Handler for CsvHandler {
    fn read(&self, info: &FileInfo, _options: &ReadOptions) -> Result<HandlerData, GeoDatasetError> {
        let bytes = std::fs::read(&info.path)?;
        Ok(HandlerData(bytes))
    }

    fn write(&self, data: &HandlerData, info: &FileInfo, options: &WriteOptions) -> Result<(), GeoDatasetError> {
        if let Some(parent) = info.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if options.append {
            use std::io::Write;
            let mut f = std::fs::OpenOptions::new().create(true).append(true).open(&info.path)?;
            f.write_all(&data.0)?;
        } else {
            std::fs::write(&info.path, &data.0)?;
        }
        Ok(())
    }

    fn handled_extensions(&self) -> &[&str] {
        &["csv", "txt", "asc"]
    }
}

/// Byte-passthrough handler, registered under no extension by default;
/// this crate's stand-in for binary scientific codecs, which are out of
/// scope here.
pub struct RawHandler;

impl Handler for RawHandler {
    fn read(&self, info: &FileInfo, _options: &ReadOptions) -> Result<HandlerData, GeoDatasetError> {
        Ok(HandlerData(std::fs::read(&info.path)?))
    }

    fn write(&self, data: &HandlerData, info: &FileInfo, _options: &WriteOptions) -> Result<(), GeoDatasetError> {
        if let Some(parent) = info.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&info.path, &data.0)?;
        Ok(())
    }

    fn handled_extensions(&self) -> &[&str] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_compression_suffix_before_lookup() {
        assert_eq!(extension_after_stripping_compression(Path::new("a.csv.gz")).as_deref(), Some("csv"));
        assert_eq!(extension_after_stripping_compression(Path::new("a.txt")).as_deref(), Some("txt"));
    }

    #[test]
    fn registry_resolves_csv_and_rejects_unknown() {
        let reg = HandlerRegistry::with_defaults();
        assert!(reg.for_path(Path::new("a.csv")).is_ok());
        assert!(reg.for_path(Path::new("a.csv.gz")).is_ok());
        let err = reg.for_path(Path::new("a.nc")).unwrap_err();
        assert!(matches!(err, GeoDatasetError::NoHandlerError { .. }));
    }
}
