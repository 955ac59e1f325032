//! File system entry points.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::io::AsyncReadExt;

use crate::hook::EntryPoint;

use super::Callback;

/// What a read is aimed at: a path, or a handle that is already open.
#[derive(Debug)]
pub enum FileTarget {
    /// A path to open and read.
    Path(PathBuf),
    /// An already-open file.
    Handle(File),
}

impl FileTarget {
    /// The path, if this target is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            FileTarget::Path(path) => Some(path),
            FileTarget::Handle(_) => None,
        }
    }
}

impl From<&str> for FileTarget {
    fn from(path: &str) -> Self {
        FileTarget::Path(PathBuf::from(path))
    }
}

impl From<&Path> for FileTarget {
    fn from(path: &Path) -> Self {
        FileTarget::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for FileTarget {
    fn from(path: PathBuf) -> Self {
        FileTarget::Path(path)
    }
}

impl From<File> for FileTarget {
    fn from(file: File) -> Self {
        FileTarget::Handle(file)
    }
}

/// Result of reading a whole file.
pub type ReadResult = io::Result<Vec<u8>>;

/// Result of listing a directory.
pub type ListResult = io::Result<Vec<PathBuf>>;

/// File system entry points.
pub struct FsApi {
    /// Read a whole file, blocking.
    pub read_file_sync: Rc<EntryPoint<FileTarget, ReadResult>>,
    /// Read a whole file.
    pub read_file: Rc<EntryPoint<FileTarget, LocalBoxFuture<'static, ReadResult>>>,
    /// Read a whole file, delivering the result to a callback.
    pub read_file_cb: Rc<EntryPoint<(FileTarget, Callback<ReadResult>), ()>>,
    /// Open a file for reading, blocking.
    pub open_sync: Rc<EntryPoint<PathBuf, io::Result<File>>>,
    /// Open a file for reading.
    pub open: Rc<EntryPoint<PathBuf, LocalBoxFuture<'static, io::Result<tokio::fs::File>>>>,
    /// List a directory, blocking.
    pub read_dir_sync: Rc<EntryPoint<PathBuf, ListResult>>,
    /// List a directory.
    pub read_dir: Rc<EntryPoint<PathBuf, LocalBoxFuture<'static, ListResult>>>,
    /// List a directory, delivering the result to a callback.
    pub read_dir_cb: Rc<EntryPoint<(PathBuf, Callback<ListResult>), ()>>,
}

impl fmt::Debug for FsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsApi").finish_non_exhaustive()
    }
}

impl FsApi {
    /// Entry points backed by `std::fs` and `tokio::fs`.
    pub fn native() -> Self {
        Self {
            read_file_sync: Rc::new(EntryPoint::new("fs.readFileSync", read_sync)),
            read_file: Rc::new(EntryPoint::new("fs.promises.readFile", |target: FileTarget| {
                read_async(target).boxed_local()
            })),
            read_file_cb: Rc::new(EntryPoint::new(
                "fs.readFile",
                |(target, callback): (FileTarget, Callback<ReadResult>)| {
                    tokio::task::spawn_local(async move { callback(read_async(target).await) });
                },
            )),
            open_sync: Rc::new(EntryPoint::new("fs.openSync", File::open)),
            open: Rc::new(EntryPoint::new("fs.promises.open", |path: PathBuf| {
                async move { tokio::fs::File::open(path).await }.boxed_local()
            })),
            read_dir_sync: Rc::new(EntryPoint::new("fs.readdirSync", list_sync)),
            read_dir: Rc::new(EntryPoint::new("fs.promises.readdir", |path: PathBuf| {
                list_async(path).boxed_local()
            })),
            read_dir_cb: Rc::new(EntryPoint::new(
                "fs.readdir",
                |(path, callback): (PathBuf, Callback<ListResult>)| {
                    tokio::task::spawn_local(async move { callback(list_async(path).await) });
                },
            )),
        }
    }
}

fn read_sync(target: FileTarget) -> ReadResult {
    match target {
        FileTarget::Path(path) => std::fs::read(path),
        FileTarget::Handle(mut file) => {
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

async fn read_async(target: FileTarget) -> ReadResult {
    match target {
        FileTarget::Path(path) => tokio::fs::read(path).await,
        FileTarget::Handle(file) => {
            let mut file = tokio::fs::File::from_std(file);
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await?;
            Ok(buf)
        }
    }
}

fn list_sync(path: PathBuf) -> ListResult {
    let mut entries = std::fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

async fn list_async(path: PathBuf) -> ListResult {
    let mut dir = tokio::fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sync_path_and_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let fs = FsApi::native();
        assert_eq!(fs.read_file_sync.call(path.clone().into()).unwrap(), b"hello");

        let handle = File::open(&path).unwrap();
        assert_eq!(fs.read_file_sync.call(handle.into()).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_read_async_and_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let fs = FsApi::native();
        let data = fs
            .read_file
            .call(dir.path().join("a.txt").into())
            .await
            .unwrap();
        assert_eq!(data, b"a");

        let listing = fs.read_dir.call(dir.path().to_path_buf()).await.unwrap();
        let names: Vec<_> = listing
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_callback_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.txt");
        std::fs::write(&path, b"cb").unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                let fs = FsApi::native();
                let (tx, rx) = tokio::sync::oneshot::channel();
                fs.read_file_cb.call((
                    path.into(),
                    Box::new(move |result: ReadResult| {
                        let _ = tx.send(result);
                    }),
                ));
                assert_eq!(rx.await.unwrap().unwrap(), b"cb");
            })
            .await;
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fs = FsApi::native();
        let err = fs
            .read_file_sync
            .call("/definitely/not/here.txt".into())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
