//! Fixed 128-byte `stat` buffer layout, little-endian. Fields the host
//! cannot supply are left zeroed.

pub const STAT_BUF_LEN: usize = 128;

#[derive(Debug, Default, Clone, Copy)]
pub struct StatInfo {
    pub mode: u32,
    pub nlink: u32,
    pub size: i64,
    pub blksize: u32,
    pub blocks: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

pub const S_IFCHR: u32 = 0o020000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;

impl StatInfo {
    /// Synthetic stat for the reserved console/debug UART descriptors,
    /// always `S_IFCHR`.
    pub fn synthetic_char_device() -> Self {
        Self { mode: S_IFCHR | 0o666, nlink: 1, ..Default::default() }
    }

    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let to_secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        };
        let mode = if meta.is_dir() {
            S_IFDIR | 0o755
        } else {
            S_IFREG | 0o644
        };
        Self {
            mode,
            nlink: 1,
            size: meta.len() as i64,
            blksize: 512,
            blocks: (meta.len() as i64 + 511) / 512,
            atime: to_secs(meta.accessed()),
            mtime: to_secs(meta.modified()),
            ctime: to_secs(meta.modified()),
        }
    }

    pub fn to_bytes(self) -> [u8; STAT_BUF_LEN] {
        let mut buf = [0u8; STAT_BUF_LEN];
        buf[16..20].copy_from_slice(&self.mode.to_le_bytes());
        buf[20..24].copy_from_slice(&self.nlink.to_le_bytes());
        buf[48..56].copy_from_slice(&self.size.to_le_bytes());
        buf[56..60].copy_from_slice(&self.blksize.to_le_bytes());
        buf[64..72].copy_from_slice(&self.blocks.to_le_bytes());
        buf[72..80].copy_from_slice(&self.atime.to_le_bytes());
        buf[80..88].copy_from_slice(&self.mtime.to_le_bytes());
        buf[88..96].copy_from_slice(&self.ctime.to_le_bytes());
        buf
    }
}
