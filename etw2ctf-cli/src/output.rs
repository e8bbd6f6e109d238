//! Filesystem-backed [`StreamSink`] (grounded on the original
//! `converter::CTFProducer`): a CTF trace is a directory containing a
//! `metadata` file and one or more stream files, opened and written to one
//! at a time.

use etw2ctf::PipelineError;
use etw2ctf::pipeline::StreamSink;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct DirectoryStreamSink {
    folder: PathBuf,
    current: Option<File>,
}

impl DirectoryStreamSink {
    /// Creates `folder` if it does not exist. If it does exist and
    /// `overwrite` is set, deletes every regular file directly inside it
    /// (never recursing into subdirectories) and reuses it; otherwise a
    /// pre-existing directory is a fatal error.
    pub fn open_folder(folder: &Path, overwrite: bool) -> Result<Self, PipelineError> {
        match fs::create_dir(folder) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !overwrite {
                    return Err(PipelineError::OutputDirectory {
                        path: folder.to_path_buf(),
                        source: e,
                    });
                }
                Self::clear_top_level_files(folder)?;
            }
            Err(e) => {
                return Err(PipelineError::OutputDirectory {
                    path: folder.to_path_buf(),
                    source: e,
                });
            }
        }

        return Ok(Self { folder: folder.to_path_buf(), current: None });
    }

    fn clear_top_level_files(folder: &Path) -> Result<(), PipelineError> {
        let entries = fs::read_dir(folder).map_err(|source| PipelineError::OutputDirectory {
            path: folder.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| PipelineError::OutputDirectory {
                path: folder.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|source| PipelineError::OutputDirectory {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        return Ok(());
    }
}

impl StreamSink for DirectoryStreamSink {
    fn open_stream(&mut self, name: &str) -> Result<(), PipelineError> {
        let path = self.folder.join(name);
        let file = File::create(&path).map_err(|source| PipelineError::StreamWrite {
            name: name.to_string(),
            source,
        })?;
        self.current = Some(file);
        return Ok(());
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        let file = self.current.as_mut().expect("write called with no open stream");
        return file.write_all(bytes).map_err(|source| PipelineError::StreamWrite {
            name: "<current>".to_string(),
            source,
        });
    }

    fn close_stream(&mut self) -> Result<(), PipelineError> {
        if let Some(mut file) = self.current.take() {
            return file.flush().map_err(|source| PipelineError::StreamWrite {
                name: "<current>".to_string(),
                source,
            });
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrite_deletes_only_top_level_files_not_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("ctf");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("stale.bin"), b"old").unwrap();
        fs::create_dir(target.join("nested")).unwrap();
        fs::write(target.join("nested").join("keep.bin"), b"keep").unwrap();

        let mut sink = DirectoryStreamSink::open_folder(&target, true).unwrap();
        assert!(!target.join("stale.bin").exists());
        assert!(target.join("nested").join("keep.bin").exists());

        sink.open_stream("stream").unwrap();
        sink.write(b"hello").unwrap();
        sink.close_stream().unwrap();
        assert_eq!(fs::read(target.join("stream")).unwrap(), b"hello");
    }

    #[test]
    fn existing_directory_without_overwrite_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("ctf");
        fs::create_dir(&target).unwrap();

        let result = DirectoryStreamSink::open_folder(&target, false);
        assert!(result.is_err());
    }
}
