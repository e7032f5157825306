//! Per-request capture targets for child stdout and stderr.
//!
//! Both files live only as long as their [`Captures`] value: dropping it
//! unlinks them, which covers every exit path of a request.

use std::fs::File;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tempfile::{Builder, NamedTempFile};

use crate::core::outcome::Stream;

#[derive(Debug)]
pub struct Captures {
    stdout: NamedTempFile,
    stderr: NamedTempFile,
}

impl Captures {
    /// Create a fresh, private pair of capture files in `dir`.
    pub fn create(dir: &Path) -> io::Result<Self> {
        let stdout = Builder::new().prefix("netexec-out-").tempfile_in(dir)?;
        let stderr = Builder::new().prefix("netexec-err-").tempfile_in(dir)?;
        Ok(Self { stdout, stderr })
    }

    /// Duplicated handles suitable for a child's stdout and stderr.
    pub fn stdio(&self) -> io::Result<(Stdio, Stdio)> {
        let stdout = self.stdout.as_file().try_clone()?;
        let stderr = self.stderr.as_file().try_clone()?;
        Ok((Stdio::from(stdout), Stdio::from(stderr)))
    }

    pub fn file(&self, stream: Stream) -> &File {
        match stream {
            Stream::Stdout => self.stdout.as_file(),
            Stream::Stderr => self.stderr.as_file(),
        }
    }

    pub fn path(&self, stream: Stream) -> &Path {
        match stream {
            Stream::Stdout => self.stdout.path(),
            Stream::Stderr => self.stderr.path(),
        }
    }
}
