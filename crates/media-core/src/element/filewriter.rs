//! File sink element

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Element;
use crate::error::{MediaError, Result};
use crate::sample::Sample;

/// Configuration for a [`FileWriter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileWriterConfig {
    /// Element identity
    pub id: String,

    /// Destination path; truncated on open
    pub path: String,

    /// Write buffer size in bytes; zero disables buffering
    #[serde(default)]
    pub buffer_size: usize,
}

/// Leaf element writing every sample payload to a file
pub struct FileWriter {
    id: String,
    path: String,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileWriter {
    /// Open the destination file and create the writer
    pub fn new(config: FileWriterConfig) -> Result<Self> {
        let file = File::create(&config.path)?;
        let writer: Box<dyn Write + Send> = if config.buffer_size > 0 {
            Box::new(BufWriter::with_capacity(config.buffer_size, file))
        } else {
            Box::new(file)
        };

        info!("FileWriter opened {}", config.path);
        Ok(Self {
            id: config.id,
            path: config.path,
            writer: Mutex::new(Some(writer)),
        })
    }
}

impl Element for FileWriter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn write(&self, sample: &Sample) -> Result<()> {
        let mut guard = self.writer.lock();
        // writes after close are ignored
        let Some(writer) = guard.as_mut() else {
            return Ok(());
        };
        writer.write_all(&sample.payload)?;
        Ok(())
    }

    fn attach(&self, _element: Arc<dyn Element>) -> Result<()> {
        Err(MediaError::AttachNotSupported)
    }

    fn close(&self) {
        if let Some(mut writer) = self.writer.lock().take() {
            if let Err(e) = writer.flush() {
                debug!("flush on close failed for {}: {}", self.path, e);
            }
            info!("FileWriter closed {}", self.path);
        }
    }
}
