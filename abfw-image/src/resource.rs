//! Resource blob codec: a flat table of (name, address, size) entries
//! followed by the concatenated file payloads they describe.

use abfw_core::magic::SIGN_ENTR;
use abfw_core::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const ENTRY_SIZE: usize = 32;
const NAME_SIZE: usize = 24;
const HEADER_SIZE: usize = 32;

/// Name-to-source-file map that preserves first-seen insertion order.
///
/// Firmware references resource entries by their positional index into the
/// blob, so the order entries are discovered in (directory-scan order, or
/// the order an order file lists them in) must survive into the built blob
/// unchanged — a plain sorted map would silently re-order everything.
#[derive(Default)]
pub struct OrderedFiles {
    order: Vec<String>,
    paths: HashMap<String, Option<PathBuf>>,
}

impl OrderedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the path for `name`, keeping its original
    /// position if it was already present.
    pub fn insert(&mut self, name: String, path: Option<PathBuf>) {
        if !self.paths.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.paths.insert(name, path);
    }

    pub fn get(&self, name: &str) -> Option<&Option<PathBuf>> {
        self.paths.get(name)
    }

    /// Iterate entries in the order they were first inserted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Option<PathBuf>)> {
        self.order.iter().map(|name| (name.as_str(), &self.paths[name]))
    }

    /// Fill in a path for every entry that doesn't have one yet, using
    /// `resolve` to turn a bare name into a candidate path. Leaves entries
    /// that already have an explicit override untouched.
    pub fn fill_missing_paths(&mut self, mut resolve: impl FnMut(&str) -> Option<PathBuf>) {
        for name in &self.order {
            let slot = self.paths.get_mut(name).expect("order and paths stay in sync");
            if slot.is_none() {
                *slot = resolve(name);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One file to place in the blob: its entry name and where its bytes come
/// from (or `None` for a deliberately empty entry).
pub struct ResourceEntry {
    /// The name recorded in the blob (truncated to 23 bytes if longer).
    pub name: String,
    /// File contents, or `None` for a zero-size placeholder entry.
    pub data: Option<Vec<u8>>,
}

/// Build a resource blob from an ordered list of entries.
///
/// Entries are packed in list order: header, then one 32-byte descriptor
/// per entry, then the file payloads themselves — each payload aligned up
/// to `align` bytes before it starts, its absolute address recorded as
/// `base + offset_into_blob`.
pub fn build_resource_blob(entries: &[ResourceEntry], base: u32, align: usize) -> Vec<u8> {
    let mut data = vec![0u8; HEADER_SIZE + entries.len() * ENTRY_SIZE];
    data[0..4].copy_from_slice(&SIGN_ENTR);
    data[28..32].copy_from_slice(&(entries.len() as u32).to_le_bytes());

    for (i, entry) in entries.iter().enumerate() {
        let name_bytes: &[u8] = entry.name.as_bytes();
        let name_bytes = if name_bytes.len() >= NAME_SIZE {
            &name_bytes[..NAME_SIZE - 1]
        } else {
            name_bytes
        };

        let pad = align_by(data.len(), align);
        data.resize(data.len() + pad, 0);

        let address = base + data.len() as u32;
        let file_data = entry.data.as_deref().unwrap_or(&[]);

        let entry_off = HEADER_SIZE + i * ENTRY_SIZE;
        data[entry_off..entry_off + name_bytes.len()].copy_from_slice(name_bytes);
        data[entry_off + NAME_SIZE..entry_off + NAME_SIZE + 4].copy_from_slice(&address.to_le_bytes());
        data[entry_off + NAME_SIZE + 4..entry_off + NAME_SIZE + 8]
            .copy_from_slice(&(file_data.len() as u32).to_le_bytes());

        data.extend_from_slice(file_data);
    }

    data
}

/// One entry recovered by [`parse_resource_blob`].
pub struct ParsedResourceEntry {
    /// The entry's null-terminated name.
    pub name: String,
    /// Offset of the entry's data within the blob.
    pub offset: usize,
    /// Entry size in bytes (zero for a placeholder entry).
    pub size: usize,
}

/// Parse a resource blob's entry table. Returns an error if the magic
/// doesn't match or the entry table would run past the blob; otherwise
/// returns every entry whose address/size sanity-checks out, stopping at
/// (and not including) the first one that doesn't.
pub fn parse_resource_blob(data: &[u8], base: u32) -> Result<Vec<ParsedResourceEntry>> {
    if data.len() < HEADER_SIZE {
        return Err(Error::header_invalid("resource blob shorter than its header"));
    }
    let magic = [data[0], data[1], data[2], data[3]];
    if magic != SIGN_ENTR {
        return Err(Error::header_invalid("resource blob magic mismatch"));
    }
    let entry_count = u32::from_le_bytes([data[28], data[29], data[30], data[31]]) as usize;

    if HEADER_SIZE + entry_count * ENTRY_SIZE >= data.len() {
        return Err(Error::header_invalid("entry table runs past the resource region"));
    }

    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let off = HEADER_SIZE + i * ENTRY_SIZE;
        let name_bytes = &data[off..off + NAME_SIZE];
        let addr = u32::from_le_bytes([
            data[off + NAME_SIZE],
            data[off + NAME_SIZE + 1],
            data[off + NAME_SIZE + 2],
            data[off + NAME_SIZE + 3],
        ]);
        let size = u32::from_le_bytes([
            data[off + NAME_SIZE + 4],
            data[off + NAME_SIZE + 5],
            data[off + NAME_SIZE + 6],
            data[off + NAME_SIZE + 7],
        ]) as usize;

        if addr < base {
            return Err(Error::OutOfRange {
                addr: addr as u64,
                size: size as u64,
            });
        }
        let rel_offset = (addr - base) as usize;
        if rel_offset + size > data.len() {
            return Err(Error::OutOfRange {
                addr: addr as u64,
                size: size as u64,
            });
        }

        let zero_idx = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..zero_idx]).into_owned();
        if name.is_empty() {
            continue;
        }

        entries.push(ParsedResourceEntry {
            name,
            offset: rel_offset,
            size,
        });
    }

    Ok(entries)
}

/// Build an ordered file list from a directory, recursively prefixing each
/// nested entry's name with its containing directory's name plus an
/// underscore — matching the reference tool's directory-scan order
/// (`scan_dir`). A name that collides with one already registered by an
/// order-file override is skipped with a warning, never silently
/// overwritten.
pub fn scan_dir(files: &mut OrderedFiles, dir: &Path, prefix: &str) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();

        if path.is_dir() {
            scan_dir(files, &path, &format!("{prefix}{file_name}_"))?;
        } else {
            let name = format!("{prefix}{file_name}");
            if let Some(Some(_)) = files.get(&name) {
                eprintln!("File \"{name}\" already exists!");
                continue;
            }
            files.insert(name, Some(path));
        }
    }

    Ok(())
}

/// Parse an order file: one entry name per line, `//` line comments,
/// blank lines ignored, and optional `name -> path` overrides (an empty
/// right-hand side clears a previously set override).
pub fn parse_order_file(files: &mut OrderedFiles, contents: &str) {
    for raw_line in contents.lines() {
        let mut line = raw_line;
        if let Some(pos) = line.find("//") {
            line = &line[..pos];
        }

        let (name, path) = if let Some(pos) = line.find("->") {
            let name = line[..pos].trim().to_string();
            let rhs = line[pos + 2..].trim();
            let path = if rhs.is_empty() { None } else { Some(PathBuf::from(rhs)) };
            (name, path)
        } else {
            (line.trim().to_string(), None)
        };

        if name.is_empty() {
            continue;
        }
        files.insert(name, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_parse_round_trip() {
        let entries = vec![
            ResourceEntry {
                name: "font".into(),
                data: Some(vec![1, 2, 3, 4]),
            },
            ResourceEntry {
                name: "icon".into(),
                data: Some(vec![0xAA; 10]),
            },
            ResourceEntry {
                name: "empty".into(),
                data: None,
            },
        ];

        let blob = build_resource_blob(&entries, 0x11000000, 32);
        let parsed = parse_resource_blob(&blob, 0x11000000).unwrap();

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].name, "font");
        assert_eq!(&blob[parsed[0].offset..parsed[0].offset + parsed[0].size], &[1, 2, 3, 4]);
        assert_eq!(parsed[2].size, 0);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let blob = vec![0u8; 64];
        assert!(parse_resource_blob(&blob, 0).is_err());
    }

    #[test]
    fn order_file_parses_overrides_and_comments() {
        let mut files = OrderedFiles::new();
        parse_order_file(
            &mut files,
            "// a comment\nfoo\nbar -> /tmp/real_bar.bin\nbaz -> \n\n",
        );
        assert_eq!(files.len(), 3);
        assert_eq!(files.get("foo"), Some(&None));
        assert_eq!(files.get("bar"), Some(&Some(PathBuf::from("/tmp/real_bar.bin"))));
        assert_eq!(files.get("baz"), Some(&None));
    }

    #[test]
    fn order_file_preserves_listed_sequence_not_sorted() {
        let mut files = OrderedFiles::new();
        parse_order_file(&mut files, "zeta\nalpha\nmid -> /tmp/mid.bin\n");
        let names: Vec<&str> = files.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }
}
