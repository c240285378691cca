//! The remote inventory tree and its wire encoding.
//!
//! `FileNode` round-trips through the binary schema below; both the native
//! and portable helper variants must emit identical bytes for identical
//! filesystems so the schema itself carries no variant-specific quirks.

/// Suffix lftp uses for partial-download sidecar files. A sibling file
/// with this suffix overrides the reported size of the download it tracks.
pub const LFTP_PGET_STATUS_SUFFIX: &str = ".lftp-pget-status";

#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
    pub time_created: Option<i64>,
    pub time_modified: Option<i64>,
    pub children: Vec<FileNode>,
}

impl FileNode {
    pub fn new_file(
        name: impl Into<String>,
        size: u64,
        time_created: Option<i64>,
        time_modified: Option<i64>,
    ) -> Self {
        FileNode { name: name.into(), size, is_dir: false, time_created, time_modified, children: Vec::new() }
    }

    /// Builds a directory node; `size` is derived from children, which are
    /// sorted by name ascending as the invariant requires.
    pub fn new_dir(
        name: impl Into<String>,
        mut children: Vec<FileNode>,
        time_created: Option<i64>,
        time_modified: Option<i64>,
    ) -> Self {
        children.sort_by(|a, b| a.name.cmp(&b.name));
        let size = children.iter().map(|c| c.size).sum();
        FileNode { name: name.into(), size, is_dir: true, time_created, time_modified, children }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(if self.is_dir { 1 } else { 0 });
        let name_bytes = self.name.as_bytes();
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&self.size.to_le_bytes());
        match self.time_created {
            Some(t) => {
                out.push(1);
                out.extend_from_slice(&t.to_le_bytes());
            }
            None => out.push(0),
        }
        match self.time_modified {
            Some(t) => {
                out.push(1);
                out.extend_from_slice(&t.to_le_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.children.len() as u32).to_le_bytes());
        for child in &self.children {
            child.encode(out);
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<(FileNode, usize), String> {
        let mut cursor = 0usize;
        let node = Self::decode_at(buf, &mut cursor)?;
        Ok((node, cursor))
    }

    fn decode_at(buf: &[u8], cursor: &mut usize) -> Result<FileNode, String> {
        let tag = take_u8(buf, cursor)?;
        let is_dir = tag == 1;
        let name_len = take_u32(buf, cursor)? as usize;
        let name_bytes = take_bytes(buf, cursor, name_len)?;
        let name = String::from_utf8(name_bytes.to_vec()).map_err(|e| e.to_string())?;
        let size = take_u64(buf, cursor)?;
        let time_created = if take_u8(buf, cursor)? == 1 { Some(take_i64(buf, cursor)?) } else { None };
        let time_modified = if take_u8(buf, cursor)? == 1 { Some(take_i64(buf, cursor)?) } else { None };
        let child_count = take_u32(buf, cursor)? as usize;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            children.push(Self::decode_at(buf, cursor)?);
        }
        Ok(FileNode { name, size, is_dir, time_created, time_modified, children })
    }
}

fn take_u8(buf: &[u8], cursor: &mut usize) -> Result<u8, String> {
    let b = *buf.get(*cursor).ok_or("unexpected end of buffer reading u8")?;
    *cursor += 1;
    Ok(b)
}

fn take_bytes<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], String> {
    let end = cursor.checked_add(len).ok_or("length overflow")?;
    let slice = buf.get(*cursor..end).ok_or("unexpected end of buffer reading bytes")?;
    *cursor = end;
    Ok(slice)
}

fn take_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, String> {
    let bytes = take_bytes(buf, cursor, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn take_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, String> {
    let bytes = take_bytes(buf, cursor, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn take_i64(buf: &[u8], cursor: &mut usize) -> Result<i64, String> {
    let bytes = take_bytes(buf, cursor, 8)?;
    Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
}

/// Adjusts a file's reported size using the contents of its
/// `.lftp-pget-status` sidecar: `size = total_size - Σ(limit_i - pos_i)`.
/// Malformed sidecars are ignored and the original size is returned.
pub fn adjust_partial_size(status_contents: &str) -> Option<u64> {
    let mut lines = status_contents.lines();
    let total: i64 = lines.next()?.strip_prefix("size=")?.trim().parse().ok()?;

    let mut positions: std::collections::HashMap<u32, i64> = std::collections::HashMap::new();
    let mut limits: std::collections::HashMap<u32, i64> = std::collections::HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=')?;
        let value: i64 = value.trim().parse().ok()?;
        if let Some(idx) = key.strip_suffix(".pos") {
            positions.insert(idx.parse().ok()?, value);
        } else if let Some(idx) = key.strip_suffix(".limit") {
            limits.insert(idx.parse().ok()?, value);
        }
    }

    let remaining: i64 = limits.iter().map(|(idx, limit)| limit - positions.get(idx).unwrap_or(&0)).sum();
    Some((total - remaining).max(0) as u64)
}
