//! Named pipe used as the local line source.

use std::{
    ffi::CString,
    fs::{self, Permissions},
    io,
    os::unix::{
        ffi::OsStrExt,
        fs::{FileTypeExt, PermissionsExt},
    },
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use fifoirc_core::{BoxedReader, PipeError, PipeOpener};
use tokio::net::unix::pipe;

/// A FIFO on the filesystem, created on demand.
#[derive(Debug, Clone)]
pub struct FifoPipe {
    path: PathBuf,
    mode: u32,
}

impl FifoPipe {
    /// Describe the pipe at `path` with permission bits `mode`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    /// Make sure a FIFO exists at the path and carries the configured mode.
    ///
    /// # Errors
    /// Fails if the path exists but is not a FIFO, or cannot be created or
    /// chmod-ed.
    pub fn prepare(&self) -> Result<(), PipeError> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() => {}
            Ok(_) => return Err(PipeError::NotAFifo(self.path.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                mkfifo(&self.path, self.mode).map_err(|source| PipeError::Create {
                    path: self.path.clone(),
                    source,
                })?;
                tracing::info!(path = %self.path.display(), "Created fifo");
            }
            Err(source) => {
                return Err(PipeError::Open {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        // mkfifo is subject to the umask; set the exact bits afterwards.
        fs::set_permissions(&self.path, Permissions::from_mode(self.mode)).map_err(|source| {
            PipeError::Permissions {
                path: self.path.clone(),
                source,
            }
        })
    }
}

#[async_trait]
impl PipeOpener for FifoPipe {
    async fn open(&self) -> Result<BoxedReader, PipeError> {
        self.prepare()?;
        let receiver = pipe::OpenOptions::new()
            .open_receiver(&self.path)
            .map_err(|source| PipeError::Open {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(path = %self.path.display(), "Opened fifo");
        Ok(Box::new(receiver))
    }
}

fn mkfifo(path: &Path, mode: u32) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
