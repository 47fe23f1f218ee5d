use std::io;
use std::path::Path;
use std::path::PathBuf;

use bumpalo::Bump;

use crate::AllocPath;
use crate::Report;

/// Where program text comes from: a named file or an in-memory one-liner.
/// The source is copied into the arena on construction, so both variants
/// hand out `&'a str` slices for the rest of the run.
#[derive(Debug, Clone, Copy)]
pub enum SourceStream<'a> {
    File { path: &'a Path, source: &'a str },
    Memory { source: &'a str },
}

impl<'a> SourceStream<'a> {
    pub fn file(bump: &'a Bump, path: &Path) -> Result<Self, OpenError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|io_error| OpenError { path: path.to_path_buf(), io_error })?;
        Ok(Self::File {
            path: bump.alloc_path(path),
            source: bump.alloc_str(&contents),
        })
    }

    pub fn memory(bump: &'a Bump, source: &str) -> Self {
        Self::Memory { source: bump.alloc_str(source) }
    }

    pub fn source(&self) -> &'a str {
        match *self {
            Self::File { source, .. } | Self::Memory { source } => source,
        }
    }

    pub fn origin(&self) -> &'a Path {
        match *self {
            Self::File { path, .. } => path,
            Self::Memory { .. } => Path::new("-e"),
        }
    }

    /// Capacity hint for the compiler's working storage, derived from the
    /// source length.
    pub fn node_box_size(&self) -> usize {
        self.source().len() / 8 + 16
    }
}

#[derive(Debug)]
pub struct OpenError {
    path: PathBuf,
    io_error: io::Error,
}

impl Report for OpenError {
    fn print(&self) {
        match self.io_error.kind() {
            io::ErrorKind::NotFound => eprintln!("{}: `{}`", self.io_error, self.path.display()),
            _ => eprintln!(
                "{} while trying to read file `{}`",
                self.io_error,
                self.path.display(),
            ),
        }
    }

    fn exit_code(&self) -> i32 {
        1
    }
}
