// Row files (bincode + gzip) and JSON records, written through atomic replace
use anyhow::{Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Serializes `value` with bincode, gzip-compressed, replacing `path` atomically.
pub fn write_rows<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|file| -> io::Result<()> {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            bincode::serialize_into(&mut encoder, value)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            encoder.finish()?.flush()
        })
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let decoder = GzDecoder::new(BufReader::new(file));
    bincode::deserialize_from(decoder)
        .map_err(|e| anyhow::anyhow!("Deserialization error in {}: {}", path.display(), e))
}

/// Pretty JSON, replacing `path` atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    AtomicFile::new(path, AllowOverwrite)
        .write(|file| file.write_all(&data))
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Item;
    use tempfile::tempdir;

    #[test]
    fn test_rows_survive_the_codec() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.bin");
        let rows = vec![
            ("a".to_string(), Item::from_pairs([("text", Item::from("hello"))])),
            ("b".to_string(), Item::from_pairs([("span", Item::Span { start: 1, end: 3 })])),
        ];
        write_rows(&path, &rows).unwrap();
        let back: Vec<(String, Item)> = read_rows(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        write_json(&path, &vec![4]).unwrap();
        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![4]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(read_rows::<Vec<Item>>(&dir.path().join("missing.bin")).is_err());
    }
}
