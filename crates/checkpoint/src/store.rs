//! The checkpoint store: named machine snapshots on disk.
//!
//! One file per checkpoint under the store directory, `<name>.ckpt`:
//!
//!   [4]   magic "VCKP"
//!   [u32] version (LE)
//!   [32]  machine state hash at capture time
//!   [u64] payload length (LE)
//!   [u64] CRC64 of the payload (LE)
//!   payload: the canonical machine snapshot
//!
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written checkpoint under its final name. A restore verifies the
//! whole file (magic, version, checksum, decoded state hash) before
//! touching the target machine.

use crate::error::{Result, StorageError};
use crate::idx;
use crc64fast::Digest;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use verdict_vm::{snapshot, Machine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub state_hash: [u8; 32],
    pub payload_len: u64,
    pub checksum: u64,
}

impl CheckpointHeader {
    pub const SIZE: usize = 4 + 4 + 32 + 8 + 8; // 56 bytes
    pub const MAGIC: [u8; 4] = *b"VCKP";
    pub const VERSION: u32 = 1;

    pub fn new(state_hash: [u8; 32], payload_len: u64, checksum: u64) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            state_hash,
            payload_len,
            checksum,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..40].copy_from_slice(&self.state_hash);
        buf[40..48].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[48..56].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;

        let magic: [u8; 4] = buf[0..4].try_into().unwrap();
        if magic != Self::MAGIC {
            return Err(StorageError::InvalidMagic);
        }

        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != Self::VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }

        let state_hash: [u8; 32] = buf[8..40].try_into().unwrap();
        let payload_len = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let checksum = u64::from_le_bytes(buf[48..56].try_into().unwrap());

        Ok(Self {
            magic,
            version,
            state_hash,
            payload_len,
            checksum,
        })
    }
}

#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    const INDEX_FILE: &'static str = "checkpoints.idx";

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Captures the machine under `name`, overwriting any previous
    /// checkpoint with the same name.
    pub fn checkpoint(&self, machine: &Machine, name: &str) -> Result<()> {
        validate_name(name)?;

        let payload = snapshot::serialize(machine)?;
        let state_hash = machine.hash();

        let mut digest = Digest::new();
        digest.write(&payload);
        let checksum = digest.sum64();

        let header = CheckpointHeader::new(state_hash, payload.len() as u64, checksum);

        let final_path = self.checkpoint_path(name);
        let tmp_path = self.dir.join(format!("{name}.ckpt.tmp"));
        if let Err(e) = write_checkpoint_file(&tmp_path, &header, &payload) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Index first: a dangling index entry is harmless (restore goes by
        // file), but a live checkpoint the index never lists is not.
        if let Err(e) =
            idx::append_metadata(self.dir.join(Self::INDEX_FILE), name, state_hash, None)
        {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp_path, &final_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        info!(
            name,
            bytes = payload.len(),
            steps = machine.step_count(),
            "wrote checkpoint"
        );
        Ok(())
    }

    /// Restores the named checkpoint into `machine`. The file is fully
    /// verified first; on any error `machine` is left untouched.
    pub fn restore(&self, machine: &mut Machine, name: &str) -> Result<()> {
        validate_name(name)?;

        let path = self.checkpoint_path(name);
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let header = CheckpointHeader::read_from(&mut file)?;
        let mut payload = Vec::new();
        file.read_to_end(&mut payload)?;

        if payload.len() as u64 != header.payload_len {
            return Err(StorageError::InvalidFormat(format!(
                "payload length {} does not match header {}",
                payload.len(),
                header.payload_len
            )));
        }

        let mut digest = Digest::new();
        digest.write(&payload);
        let found = digest.sum64();
        if found != header.checksum {
            return Err(StorageError::ChecksumMismatch {
                expected: header.checksum,
                found,
            });
        }

        let restored = snapshot::deserialize(&payload)?;
        if restored.hash() != header.state_hash {
            return Err(StorageError::StateHashMismatch);
        }

        *machine = restored;
        info!(name, steps = machine.step_count(), "restored checkpoint");
        Ok(())
    }

    /// True when a checkpoint file exists under this name.
    pub fn contains(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.checkpoint_path(name).exists()
    }

    /// All checkpoint names ever written, in write order, deduplicated to
    /// the latest occurrence of each name.
    pub fn names(&self) -> Result<Vec<String>> {
        let idx_path = self.dir.join(Self::INDEX_FILE);
        if !idx_path.exists() {
            return Ok(Vec::new());
        }
        let entries = idx::read_all(idx_path)?;
        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            names.retain(|n| *n != entry.name);
            names.push(entry.name);
        }
        Ok(names)
    }

    fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.ckpt"))
    }
}

fn write_checkpoint_file(path: &Path, header: &CheckpointHeader, payload: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&header.to_bytes())?;
    file.write_all(payload)?;
    file.sync_data()?;
    Ok(())
}

/// Names become file names, so only a conservative character set is
/// accepted: ASCII alphanumerics plus `-`, `_`, and `.`.
fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.len() <= 255
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = CheckpointHeader::new([0xCD; 32], 512, 0xDEADBEEF);
        let bytes = header.to_bytes();
        let decoded = CheckpointHeader::read_from(&bytes[..]).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut bytes = CheckpointHeader::new([0u8; 32], 0, 0).to_bytes();
        bytes[0..4].copy_from_slice(b"NOPE");
        let result = CheckpointHeader::read_from(&bytes[..]);
        assert!(matches!(result, Err(StorageError::InvalidMagic)));
    }

    #[test]
    fn test_header_rejects_unknown_version() {
        let mut bytes = CheckpointHeader::new([0u8; 32], 0, 0).to_bytes();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let result = CheckpointHeader::read_from(&bytes[..]);
        assert!(matches!(result, Err(StorageError::UnsupportedVersion(99))));
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("genesis").is_ok());
        assert!(validate_name("run-42_a.b").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("space name").is_err());
        assert!(validate_name(&"x".repeat(256)).is_err());
    }
}
