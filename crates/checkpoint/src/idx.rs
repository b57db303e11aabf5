use crate::error::Result;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub timestamp: u64,
    pub state_hash: [u8; 32],
    pub name_len: u32,
    pub name: String,
}

impl IndexEntry {
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; 44]; // 8 + 32 + 4
        reader.read_exact(&mut buf)?;

        let timestamp = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let state_hash: [u8; 32] = buf[8..40].try_into().unwrap();
        let name_len = u32::from_le_bytes(buf[40..44].try_into().unwrap());

        let mut name_bytes = vec![0u8; name_len as usize];
        reader.read_exact(&mut name_bytes)?;

        let name = String::from_utf8(name_bytes).map_err(|e| {
            crate::error::StorageError::InvalidFormat(format!("Invalid UTF-8 in name: {}", e))
        })?;

        Ok(Self {
            timestamp,
            state_hash,
            name_len,
            name,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(44 + self.name.len());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&self.state_hash);
        buf.extend_from_slice(&self.name_len.to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf
    }
}

pub fn append_metadata(
    path: impl AsRef<Path>,
    name: &str,
    state_hash: [u8; 32],
    timestamp: Option<u64>,
) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let timestamp = timestamp.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    });

    let entry = IndexEntry {
        timestamp,
        state_hash,
        name_len: name.len() as u32,
        name: name.to_string(),
    };

    file.write_all(&entry.to_bytes())?;
    file.sync_data()?;

    Ok(())
}

pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<IndexEntry>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();

    loop {
        match IndexEntry::read_from(&mut reader) {
            Ok(entry) => entries.push(entry),
            Err(crate::error::StorageError::IoError(e))
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(e),
        }
    }

    Ok(entries)
}
