//! Uploaded items and incremental size enforcement while receiving them.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use tempfile::SpooledTempFile;

use crate::config::LimitsConfig;
use crate::error::{Error, Result};

/// Where an item's bytes live until they are staged.
pub enum InputData {
    Memory(Bytes),
    /// Kept in memory below the spool threshold, spilled to a temp file above it
    Spooled(SpooledTempFile),
}

/// One uploaded file: the caller-supplied name plus its content.
pub struct InputItem {
    filename: String,
    size: u64,
    data: InputData,
}

impl InputItem {
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            filename: filename.into(),
            size: data.len() as u64,
            data: InputData::Memory(data),
        }
    }

    /// Read a file from disk, named by its path.
    ///
    /// An unreadable file is reported as a decode failure for that item.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let data = std::fs::read(path).map_err(|e| Error::decode(&name, e))?;
        Ok(Self::from_bytes(name, data))
    }

    /// Caller-supplied name. Used for filtering and labels only, never as a storage key.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Reader over the item's full content.
    pub fn into_reader(self) -> io::Result<Box<dyn Read + Send>> {
        match self.data {
            InputData::Memory(bytes) => Ok(Box::new(Cursor::new(bytes))),
            InputData::Spooled(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                Ok(Box::new(file))
            }
        }
    }
}

impl std::fmt::Debug for InputItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backing = match &self.data {
            InputData::Memory(_) => "memory",
            InputData::Spooled(file) if file.is_rolled() => "disk",
            InputData::Spooled(_) => "spool",
        };
        f.debug_struct("InputItem")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("backing", &backing)
            .finish()
    }
}

/// An item currently being received.
pub struct PendingItem {
    filename: String,
    file: SpooledTempFile,
    size: u64,
}

impl PendingItem {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub const fn size(&self) -> u64 {
        self.size
    }
}

/// Receives a request's items chunk by chunk, failing as soon as either the
/// per-item or the aggregate cap is crossed.
pub struct UploadSpooler {
    limits: LimitsConfig,
    total: u64,
    items: Vec<InputItem>,
}

impl UploadSpooler {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            limits: limits.clone(),
            total: 0,
            items: Vec::new(),
        }
    }

    pub fn start_item(&self, filename: impl Into<String>) -> PendingItem {
        let threshold = usize::try_from(self.limits.memory_threshold_bytes).unwrap_or(usize::MAX);
        PendingItem {
            filename: filename.into(),
            file: SpooledTempFile::new(threshold),
            size: 0,
        }
    }

    pub fn write_chunk(&mut self, item: &mut PendingItem, chunk: &[u8]) -> Result<()> {
        let len = chunk.len() as u64;

        let item_size = item.size.saturating_add(len);
        if item_size > self.limits.max_item_bytes {
            return Err(Error::ItemTooLarge {
                filename: item.filename.clone(),
                size: item_size,
                limit: self.limits.max_item_bytes,
            });
        }

        let total = self.total.saturating_add(len);
        if total > self.limits.max_request_bytes {
            return Err(Error::RequestTooLarge {
                size: total,
                limit: self.limits.max_request_bytes,
            });
        }

        item.file.write_all(chunk)?;
        item.size = item_size;
        self.total = total;
        Ok(())
    }

    pub fn finish_item(&mut self, item: PendingItem) {
        self.items.push(InputItem {
            filename: item.filename,
            size: item.size,
            data: InputData::Spooled(item.file),
        });
    }

    /// Bytes accepted so far across all items.
    pub const fn total_bytes(&self) -> u64 {
        self.total
    }

    pub fn into_items(self) -> Vec<InputItem> {
        self.items
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn limits(item: u64, request: u64, threshold: u64) -> LimitsConfig {
        LimitsConfig {
            max_item_bytes: item,
            max_request_bytes: request,
            memory_threshold_bytes: threshold,
        }
    }

    fn read_all(item: InputItem) -> Vec<u8> {
        let mut buf = Vec::new();
        item.into_reader().unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"png bytes").unwrap();

        let item = InputItem::from_path(&path).unwrap();
        assert!(item.filename().ends_with("page.png"));
        assert_eq!(item.size(), 9);
        assert_eq!(read_all(item), b"png bytes");
    }

    #[test]
    fn test_from_path_missing_file_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = InputItem::from_path(dir.path().join("gone.jpg")).unwrap_err();
        assert!(matches!(err, Error::Decode { ref name, .. } if name.ends_with("gone.jpg")));
    }

    #[test]
    fn test_spooled_item_round_trips_above_threshold() {
        let mut spooler = UploadSpooler::new(&limits(1024, 4096, 8));
        let mut item = spooler.start_item("scan.png");
        spooler.write_chunk(&mut item, b"0123456789").unwrap();
        spooler.write_chunk(&mut item, b"abcdef").unwrap();
        spooler.finish_item(item);

        let items = spooler.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].filename(), "scan.png");
        assert_eq!(items[0].size(), 16);
        assert!(format!("{:?}", items[0]).contains("disk"));

        let item = items.into_iter().next().unwrap();
        assert_eq!(read_all(item), b"0123456789abcdef");
    }

    #[test]
    fn test_item_cap_trips_mid_stream() {
        let mut spooler = UploadSpooler::new(&limits(10, 100, 1024));
        let mut item = spooler.start_item("big.jpg");
        spooler.write_chunk(&mut item, &[0; 8]).unwrap();

        let err = spooler.write_chunk(&mut item, &[0; 8]).unwrap_err();
        assert!(matches!(
            err,
            Error::ItemTooLarge { ref filename, size: 16, limit: 10 } if filename == "big.jpg"
        ));
    }

    #[test]
    fn test_request_cap_spans_items() {
        let mut spooler = UploadSpooler::new(&limits(10, 15, 1024));
        let mut first = spooler.start_item("a.png");
        spooler.write_chunk(&mut first, &[1; 10]).unwrap();
        spooler.finish_item(first);

        let mut second = spooler.start_item("b.png");
        let err = spooler.write_chunk(&mut second, &[1; 6]).unwrap_err();
        assert!(matches!(err, Error::RequestTooLarge { size: 16, limit: 15 }));
        assert_eq!(spooler.total_bytes(), 10);
    }

    #[test]
    fn test_exact_caps_are_allowed() {
        let mut spooler = UploadSpooler::new(&limits(4, 8, 1024));
        for name in ["a.gif", "b.gif"] {
            let mut item = spooler.start_item(name);
            spooler.write_chunk(&mut item, &[7; 4]).unwrap();
            spooler.finish_item(item);
        }
        assert_eq!(spooler.total_bytes(), 8);
    }

    #[test]
    fn test_memory_item() {
        let item = InputItem::from_bytes("photo.jpg", Bytes::from_static(b"jpeg"));
        assert_eq!(item.size(), 4);
        assert_eq!(read_all(item), b"jpeg");
    }
}
