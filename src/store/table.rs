use crate::store::proto::{SCHEMA_VERSION, TableProto};
use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{Span, warn};

/// Internal storage failures. Logged and absorbed, never returned to callers.
#[derive(thiserror::Error, Debug)]
pub(crate) enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Unsupported schema version: {0}")]
    Version(u32),
}

/// Outcome of a table update: whether the table must be rewritten.
pub(crate) enum Change<R> {
    Write(R),
    Keep(R),
}

/// One protocol table persisted as a single prost-encoded file.
///
/// Every read and update holds the table's mutex, and a write replaces the
/// file atomically, so concurrent callers never observe a torn table.
pub(crate) struct Table<T> {
    path: PathBuf,
    lock: Mutex<()>,
    span: Span,
    _table: PhantomData<fn() -> T>,
}

impl<T: TableProto> Table<T> {
    pub(crate) fn new(path: PathBuf, span: Span) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            span,
            _table: PhantomData,
        }
    }

    /// Returns the stored table, or an empty one if it is missing or unreadable.
    pub(crate) fn load(&self) -> T {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_or_default()
    }

    /// Applies `f` to the current table and persists it when asked to.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut T) -> Change<R>) -> R {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut table = self.read_or_default();

        match f(&mut table) {
            Change::Keep(result) => result,
            Change::Write(result) => {
                table.set_version(SCHEMA_VERSION);
                if let Err(err) = write_atomically(&self.path, &table.encode_to_vec()) {
                    warn!(
                        parent: &self.span,
                        path = %self.path.display(),
                        error = %err,
                        "Failed to write protocol table"
                    );
                }
                result
            }
        }
    }

    /// Removes the table file.
    pub(crate) fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                parent: &self.span,
                path = %self.path.display(),
                error = %err,
                "Failed to remove protocol table"
            ),
        }
    }

    fn read_or_default(&self) -> T {
        match self.read() {
            Ok(table) => table,
            Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => T::default(),
            Err(err) => {
                warn!(
                    parent: &self.span,
                    path = %self.path.display(),
                    error = %err,
                    "Failed to read protocol table, treating it as empty"
                );
                T::default()
            }
        }
    }

    fn read(&self) -> Result<T, StoreError> {
        let bytes = fs::read(&self.path)?;
        let table = T::decode(bytes.as_slice())?;
        if table.version() > SCHEMA_VERSION {
            return Err(StoreError::Version(table.version()));
        }

        Ok(table)
    }
}

/// Replaces `path` with `bytes` via a synced sibling temporary file and a rename.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::proto::PreKeyTableProto;
    use prost::Message;

    fn table(dir: &Path) -> Table<PreKeyTableProto> {
        Table::new(dir.join("prekeys.pb"), Span::none())
    }

    #[test]
    fn test_missing_table_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prekeys = table(dir.path());

        assert!(prekeys.load().keys.is_empty());
    }

    #[test]
    fn test_update_persists_and_keep_skips_write() {
        let dir = tempfile::tempdir().unwrap();
        let prekeys = table(dir.path());

        prekeys.update(|t| {
            t.keys.insert(1, vec![1; 36]);
            Change::Write(())
        });
        assert_eq!(table(dir.path()).load().keys.len(), 1);
        assert_eq!(table(dir.path()).load().version, SCHEMA_VERSION);

        let modified = fs::metadata(dir.path().join("prekeys.pb"))
            .unwrap()
            .modified()
            .unwrap();
        prekeys.update(|t| {
            t.keys.insert(2, vec![2; 36]);
            Change::Keep(())
        });
        assert_eq!(prekeys.load().keys.len(), 1);
        assert_eq!(
            fs::metadata(dir.path().join("prekeys.pb"))
                .unwrap()
                .modified()
                .unwrap(),
            modified
        );
    }

    #[test]
    fn test_corrupt_table_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("prekeys.pb"), [0xFF, 0xFF, 0xFF]).unwrap();

        assert!(table(dir.path()).load().keys.is_empty());
    }

    #[test]
    fn test_newer_schema_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let newer = PreKeyTableProto {
            version: SCHEMA_VERSION + 1,
            keys: [(1, vec![0; 36])].into_iter().collect(),
        };
        fs::write(dir.path().join("prekeys.pb"), newer.encode_to_vec()).unwrap();

        assert!(table(dir.path()).load().keys.is_empty());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let prekeys = table(dir.path());
        prekeys.update(|t| {
            t.keys.insert(1, vec![1; 36]);
            Change::Write(())
        });

        prekeys.clear();
        prekeys.clear();
        assert!(!dir.path().join("prekeys.pb").exists());
    }

    #[test]
    fn test_atomic_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.pb");

        write_atomically(&path, b"abc").unwrap();
        write_atomically(&path, b"abcd").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"abcd");
        assert!(!dir.path().join("nested").join("table.pb.tmp").exists());
    }
}
