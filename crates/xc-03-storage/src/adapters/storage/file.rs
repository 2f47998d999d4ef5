use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore, ScanResult};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File header: magic followed by a CRC32 of the body.
const MAGIC: &[u8; 4] = b"XCKV";
const HEADER_LEN: usize = 8;

/// File-backed key-value store for deployments without RocksDB.
///
/// The whole map is rewritten through a temp file and an atomic rename on
/// every write, so a crash leaves either the old or the new file. A CRC32
/// over the body turns torn or tampered files into a corruption error at
/// open instead of silently losing rows.
pub struct FileBackedKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    path: PathBuf,
}

impl FileBackedKVStore {
    /// Open the store at `path`, creating it lazily on first write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => {
                let data = Self::decode(&bytes)?;
                info!(
                    path = %path.display(),
                    bytes = bytes.len(),
                    keys = data.len(),
                    "Loaded storage file"
                );
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No existing storage file");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(KVStoreError::IOError {
                    message: e.to_string(),
                })
            }
        };
        Ok(Self { data, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(message: impl Into<String>) -> KVStoreError {
        KVStoreError::CorruptionError {
            message: message.into(),
        }
    }

    fn decode(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(Self::corrupt("missing storage file header"));
        }
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&bytes[4..HEADER_LEN]);
        let body = &bytes[HEADER_LEN..];
        if crc32fast::hash(body) != u32::from_le_bytes(crc) {
            return Err(Self::corrupt("storage file checksum mismatch"));
        }

        // Body: [key_len:u32][key][value_len:u32][value]...
        let mut data = BTreeMap::new();
        let mut cursor = 0;
        while cursor < body.len() {
            let key_len = Self::read_len(body, &mut cursor)?;
            let key = Self::take(body, &mut cursor, key_len)?.to_vec();
            let value_len = Self::read_len(body, &mut cursor)?;
            let value = Self::take(body, &mut cursor, value_len)?.to_vec();
            data.insert(key, value);
        }
        Ok(data)
    }

    fn take<'a>(body: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], KVStoreError> {
        let slice = body
            .get(*cursor..*cursor + len)
            .ok_or_else(|| Self::corrupt("truncated storage file"))?;
        *cursor += len;
        Ok(slice)
    }

    fn read_len(body: &[u8], cursor: &mut usize) -> Result<usize, KVStoreError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(Self::take(body, cursor, 4)?);
        Ok(u32::from_le_bytes(raw) as usize)
    }

    fn save_to_file(&self) -> Result<(), KVStoreError> {
        let io = |e: std::io::Error| KVStoreError::IOError {
            message: e.to_string(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        let mut body = Vec::new();
        for (key, value) in &self.data {
            body.extend_from_slice(&(key.len() as u32).to_le_bytes());
            body.extend_from_slice(key);
            body.extend_from_slice(&(value.len() as u32).to_le_bytes());
            body.extend_from_slice(value);
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path).map_err(io)?;
        file.write_all(MAGIC).map_err(io)?;
        file.write_all(&crc32fast::hash(&body).to_le_bytes())
            .map_err(io)?;
        file.write_all(&body).map_err(io)?;
        file.sync_all().map_err(io)?;

        std::fs::rename(&temp_path, &self.path).map_err(io)
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::put(key, value)])
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), KVStoreError> {
        self.atomic_batch_write(vec![BatchOperation::delete(key)])
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let previous = self.data.clone();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        if let Err(e) = self.save_to_file() {
            // Keep memory consistent with disk.
            self.data = previous;
            return Err(e);
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<ScanResult, KVStoreError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
