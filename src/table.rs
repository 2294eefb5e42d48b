//! File + mapping manager, append engine, flush policy, and scanner for a
//! single Table V2 file: an append-only, memory-mapped, fixed-width-row
//! table.
//!
//! Layout on disk (see spec §6 for the authoritative byte ranges):
//! a 256-byte header (magic, version, row stride, row count, column
//! descriptors) followed by `num_rows * row_stride` bytes of packed rows.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use memmap2::MmapMut;
use tracing::{debug, info, warn};

use crate::config::{
    COLUMN_DESCRIPTOR_SIZE, FORMAT_VERSION, GROWTH_FACTOR, HEADER_SIZE, INITIAL_MAP_SIZE,
    MAGIC, MAX_COLUMNS, MAX_COLUMN_NAME_LEN, SYNC_INTERVAL_MS, SYNC_INTERVAL_ROWS,
};
use crate::error::{RistrettoError, RistrettoResult};
use crate::schema::{self, ColumnDescriptor, ColumnType, TableSchema};
use crate::value::{self, Value};

/// A handle to one open `.rdb` table file.
///
/// Single-writer per handle, single-writer per file: two handles opened
/// against the same file race on the header's row counter. This is an
/// accepted limitation (see spec §5) — the engine does not attempt to
/// detect or prevent two handles sharing one file.
pub struct Table {
    file: File,
    mmap: MmapMut,
    schema: TableSchema,
    path: PathBuf,
    mapped_size: u64,
    write_offset: u64,
    rows_since_flush: u64,
    last_flush: Instant,
    closed: bool,
}

impl Table {
    /// Creates `<storage_root>/<name>.rdb`, compiling `schema_sql` into the
    /// fixed row layout stored in the header.
    pub fn create(
        storage_root: impl AsRef<Path>,
        name: &str,
        schema_sql: &str,
    ) -> RistrettoResult<Table> {
        let schema = schema::compile(schema_sql)?;
        let path = table_path(storage_root.as_ref(), name);

        ensure_storage_dir(storage_root.as_ref())?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(INITIAL_MAP_SIZE)?;

        // SAFETY: `file` was just created/truncated/sized by this process and
        // no other mapping of it exists yet.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        write_header(&mut mmap, &schema);

        info!(table = %name, columns = schema.column_count(), row_stride = schema.row_stride, "table created");

        Ok(Table {
            file,
            mmap,
            schema,
            path,
            mapped_size: INITIAL_MAP_SIZE,
            write_offset: HEADER_SIZE as u64,
            rows_since_flush: 0,
            last_flush: Instant::now(),
            closed: false,
        })
    }

    /// Opens an existing table file, validating its header.
    pub fn open(storage_root: impl AsRef<Path>, name: &str) -> RistrettoResult<Table> {
        let path = table_path(storage_root.as_ref(), name);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let metadata = file.metadata()?;
        if metadata.len() < HEADER_SIZE as u64 {
            return Err(RistrettoError::InvalidFormat(format!(
                "{} is smaller than the {HEADER_SIZE}-byte header",
                path.display()
            )));
        }

        // SAFETY: `file` was just opened by this process with read/write
        // access and its length was validated above.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let schema = read_and_validate_header(&mmap)?;
        let mapped_size = metadata.len();
        let num_rows = header_num_rows(&mmap);
        let write_offset = HEADER_SIZE as u64 + num_rows * schema.row_stride as u64;

        info!(table = %name, rows = num_rows, "table opened");

        Ok(Table {
            file,
            mmap,
            schema,
            path,
            mapped_size,
            write_offset,
            rows_since_flush: 0,
            last_flush: Instant::now(),
            closed: false,
        })
    }

    /// Convenience wrapper over [`Table::create`] using
    /// [`crate::config::DEFAULT_STORAGE_DIR`], matching the collaborator
    /// contract's `create(name, schema_sql)` signature.
    pub fn create_default(name: &str, schema_sql: &str) -> RistrettoResult<Table> {
        Self::create(crate::config::DEFAULT_STORAGE_DIR, name, schema_sql)
    }

    /// Convenience wrapper over [`Table::open`] using
    /// [`crate::config::DEFAULT_STORAGE_DIR`].
    pub fn open_default(name: &str) -> RistrettoResult<Table> {
        Self::open(crate::config::DEFAULT_STORAGE_DIR, name)
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn column_desc(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.schema.column(name)
    }

    pub fn row_count(&self) -> u64 {
        header_num_rows(&self.mmap)
    }

    /// Appends one row. On success the row is durably resident in the
    /// mapped region and visible to any subsequent scan on this handle; on
    /// failure no counters change and no row becomes visible.
    pub fn append(&mut self, values: &[Value]) -> RistrettoResult<()> {
        if self.closed {
            return Err(RistrettoError::HandleClosed);
        }

        let row_stride = self.schema.row_stride as u64;
        if self.write_offset + row_stride > self.mapped_size {
            if let Err(e) = self.grow() {
                self.closed = true;
                return Err(e);
            }
        }

        let start = self.write_offset as usize;
        let end = start + row_stride as usize;
        let row_slot = &mut self.mmap[start..end];
        value::pack(&self.schema, values, row_slot)?;

        self.write_offset += row_stride;
        self.rows_since_flush += 1;
        bump_num_rows(&mut self.mmap);

        if self.rows_since_flush >= SYNC_INTERVAL_ROWS
            || self.last_flush.elapsed().as_millis() >= SYNC_INTERVAL_MS
        {
            // A flush failure here is reported to the caller like any other
            // append failure, but the row already written above stays
            // visible — durability lag, not data loss.
            self.flush()?;
        }

        Ok(())
    }

    /// Doubles the file and mapping size. Any pointer into the old mapping
    /// — including the header view used above — is invalid the instant
    /// this returns; nothing outside this function is allowed to cache one
    /// across a call to `append`.
    fn grow(&mut self) -> RistrettoResult<()> {
        let new_size = self.mapped_size * GROWTH_FACTOR;
        debug!(old_size = self.mapped_size, new_size, "growing table mapping");

        // Drop the old mapping before extending the file; some platforms
        // refuse to truncate/extend a file that is still mapped. `mmap` is
        // not `Option`-wrapped, so swap in a throwaway 1-byte anonymous
        // mapping for the instant between unmapping the old file and
        // mapping the grown one.
        self.mmap.flush()?;
        let placeholder = MmapMut::map_anon(1)?;
        let old = std::mem::replace(&mut self.mmap, placeholder);
        drop(old);

        self.file.set_len(new_size)?;
        // SAFETY: the file was just grown to `new_size` and no other
        // mapping of it exists (the old one was dropped above).
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.mapped_size = new_size;
        Ok(())
    }

    /// Requests an asynchronous memory sync over the live prefix of the
    /// map (header through the current write offset). Does not wait for
    /// device completion.
    pub fn flush(&mut self) -> RistrettoResult<()> {
        if self.closed {
            return Err(RistrettoError::HandleClosed);
        }
        self.mmap.flush_async_range(0, self.write_offset as usize)?;
        self.rows_since_flush = 0;
        self.last_flush = Instant::now();
        debug!(write_offset = self.write_offset, "flush issued");
        Ok(())
    }

    /// Visits every row stored at scan entry, in insertion order. Rows
    /// appended during the scan are not required to be visible.
    pub fn select<F>(&self, mut visitor: F) -> RistrettoResult<()>
    where
        F: FnMut(&[Value]),
    {
        if self.closed {
            return Err(RistrettoError::HandleClosed);
        }
        let row_stride = self.schema.row_stride as usize;
        let num_rows = header_num_rows(&self.mmap);

        let mut offset = HEADER_SIZE;
        for _ in 0..num_rows {
            let row_buf = &self.mmap[offset..offset + row_stride];
            let values = value::unpack(&self.schema, row_buf);
            visitor(&values);
            offset += row_stride;
        }
        Ok(())
    }

    /// Flushes synchronously (from the caller's perspective — it waits for
    /// the sync call to return, not the device), unmaps, and closes the
    /// descriptor. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.mmap.flush() {
            warn!(table = %self.path.display(), error = %err, "flush on close failed");
        }
        self.closed = true;
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.close();
    }
}

fn table_path(storage_root: &Path, name: &str) -> PathBuf {
    storage_root.join(format!("{name}.rdb"))
}

fn ensure_storage_dir(storage_root: &Path) -> RistrettoResult<()> {
    if storage_root.exists() {
        return Ok(());
    }
    fs::create_dir_all(storage_root)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o755);
        fs::set_permissions(storage_root, perms)?;
    }
    Ok(())
}

// --- Header (de)serialization -------------------------------------------
//
// Every multi-byte header field is little-endian, per spec §6, regardless
// of host endianness — only row payload data (§4.2) is native-endian.

fn write_header(mmap: &mut MmapMut, schema: &TableSchema) {
    mmap[0..8].copy_from_slice(&MAGIC);
    mmap[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    mmap[12..16].copy_from_slice(&schema.row_stride.to_le_bytes());
    mmap[16..24].copy_from_slice(&0u64.to_le_bytes()); // num_rows
    mmap[24..28].copy_from_slice(&(schema.column_count() as u32).to_le_bytes());
    mmap[28..40].fill(0); // reserved

    for (i, col) in schema.columns.iter().enumerate() {
        let base = 40 + i * COLUMN_DESCRIPTOR_SIZE;
        let mut name_bytes = [0u8; MAX_COLUMN_NAME_LEN];
        let src = col.name.as_bytes();
        let n = src.len().min(MAX_COLUMN_NAME_LEN);
        name_bytes[..n].copy_from_slice(&src[..n]);
        mmap[base..base + MAX_COLUMN_NAME_LEN].copy_from_slice(&name_bytes);
        mmap[base + 8] = col.col_type as u8;
        mmap[base + 9] = col.length as u8;
        mmap[base + 10..base + 12].copy_from_slice(&col.offset.to_le_bytes());
        mmap[base + 12..base + 16].fill(0); // reserved
    }
}

fn read_and_validate_header(mmap: &MmapMut) -> RistrettoResult<TableSchema> {
    if &mmap[0..8] != MAGIC {
        return Err(RistrettoError::InvalidFormat(
            "magic bytes do not match RSTRDB\\0\\0".into(),
        ));
    }
    let version = u32::from_le_bytes(mmap[8..12].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(RistrettoError::InvalidFormat(format!(
            "unsupported format version {version}"
        )));
    }
    let row_stride = u32::from_le_bytes(mmap[12..16].try_into().unwrap());
    let column_count = u32::from_le_bytes(mmap[24..28].try_into().unwrap()) as usize;
    if column_count == 0 || column_count > MAX_COLUMNS {
        return Err(RistrettoError::InvalidFormat(format!(
            "invalid column count {column_count}"
        )));
    }

    let mut columns = Vec::with_capacity(column_count);
    for i in 0..column_count {
        let base = 40 + i * COLUMN_DESCRIPTOR_SIZE;
        let name_bytes = &mmap[base..base + MAX_COLUMN_NAME_LEN];
        let nul_at = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..nul_at]).into_owned();
        let tag = mmap[base + 8];
        let col_type = ColumnType::from_tag(tag).ok_or_else(|| {
            RistrettoError::InvalidFormat(format!("unknown column type tag {tag}"))
        })?;
        let length = mmap[base + 9] as u16;
        let offset = u16::from_le_bytes(mmap[base + 10..base + 12].try_into().unwrap());
        columns.push(ColumnDescriptor {
            name,
            col_type,
            length,
            offset,
        });
    }

    Ok(TableSchema {
        columns,
        row_stride,
    })
}

fn header_num_rows(mmap: &MmapMut) -> u64 {
    u64::from_le_bytes(mmap[16..24].try_into().unwrap())
}

fn bump_num_rows(mmap: &mut MmapMut) {
    let current = header_num_rows(mmap);
    mmap[16..24].copy_from_slice(&(current + 1).to_le_bytes());
}
