//! Byte sources and mesh formats

use std::{
    fmt,
    fs::File,
    io::{Cursor, Read},
    path::Path,
};

use crate::error::LoadError;

use super::loader::LoadProgress;

/// Upper bound on the up-front buffer reservation
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// Container format of a mesh asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    /// Autodesk FBX, binary or ASCII
    Fbx,
    /// Wavefront OBJ
    Obj,
}

impl MeshFormat {
    /// Guesses the format from a file extension, case-insensitively
    pub fn from_extension(path: impl AsRef<Path>) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "fbx" => Some(MeshFormat::Fbx),
            "obj" => Some(MeshFormat::Obj),
            _ => None,
        }
    }
}

/// A readable stream of asset bytes with an optional declared length
pub struct ByteSource {
    name: String,
    total: Option<u64>,
    reader: Box<dyn Read + Send>,
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteSource")
            .field("name", &self.name)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl ByteSource {
    /// Opens a file; its length on disk becomes the declared total
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let total = file.metadata()?.len();
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("model")
            .to_string();
        Ok(Self {
            name,
            total: Some(total),
            reader: Box::new(file),
        })
    }

    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            total: Some(bytes.len() as u64),
            reader: Box::new(Cursor::new(bytes)),
        }
    }

    /// Wraps an arbitrary reader; pass `None` when the length is unknown
    pub fn from_reader(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        total: Option<u64>,
    ) -> Self {
        Self {
            name: name.into(),
            total,
            reader: Box::new(reader),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared length in bytes
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Reads the whole stream in `chunk_size` pieces
    ///
    /// Reports progress after every chunk. Fractions never decrease and never
    /// exceed 1. Stops with [`LoadError::Superseded`] as soon as `cancelled`
    /// returns true, and with [`LoadError::IncompleteData`] if the stream ends
    /// short of the declared total.
    pub fn read_all(
        mut self,
        chunk_size: usize,
        cancelled: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(LoadProgress),
    ) -> Result<Vec<u8>, LoadError> {
        let chunk_size = chunk_size.max(1);
        // Declared totals are untrusted
        let capacity = self
            .total
            .map_or(chunk_size, |total| total.min(MAX_PREALLOCATION as u64) as usize);
        let mut data = Vec::with_capacity(capacity);
        let mut chunk = vec![0u8; chunk_size];
        let mut last_fraction = 0.0f32;

        loop {
            if cancelled() {
                return Err(LoadError::Superseded);
            }
            let read = match self.reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            data.extend_from_slice(&chunk[..read]);

            match self.total {
                Some(total) if total > 0 => {
                    let fraction = (data.len() as f64 / total as f64).min(1.0) as f32;
                    last_fraction = last_fraction.max(fraction);
                    progress(LoadProgress::Fraction(last_fraction));
                }
                _ => progress(LoadProgress::Indeterminate {
                    bytes_read: data.len() as u64,
                }),
            }
        }

        if let Some(total) = self.total {
            if (data.len() as u64) < total {
                return Err(LoadError::IncompleteData(format!(
                    "stream ended after {} of {} bytes",
                    data.len(),
                    total
                )));
            }
        }
        log::debug!("Read {} bytes from '{}'", data.len(), self.name);
        Ok(data)
    }
}
