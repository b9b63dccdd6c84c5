//! `.npy` array I/O.
//!
//! Large 2D token arrays go through [`SequenceWriter`], which preallocates a
//! memory-mapped backing file from an upper-bound row estimate and truncates
//! to the actual row count on finish, so resident memory stays bounded and
//! an augmentation shortfall never leaves oversized output. Small index
//! arrays are written whole via `npyz`. All writers target `*.npy.tmp` and
//! rename on success, so a crashed run never leaves a discoverable chunk.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use indicatif::ProgressBar;
use memmap2::MmapMut;
use npyz::{NpyFile, WriteOptions, WriterBuilder};

/// Fixed space reserved for the npy v1.0 header, so the shape can be
/// rewritten in place when the array is truncated.
const HEADER_LEN: usize = 128;

fn npy_header_2d_u8(rows: usize, row_len: usize) -> Result<[u8; HEADER_LEN]> {
    let dict = format!("{{'descr': '|u1', 'fortran_order': False, 'shape': ({rows}, {row_len}), }}");
    // magic(6) + version(2) + header-len(2) + dict + padding + '\n'
    if dict.len() + 11 > HEADER_LEN {
        bail!("npy header dict does not fit in {HEADER_LEN} bytes");
    }
    let mut header = [b' '; HEADER_LEN];
    header[..6].copy_from_slice(b"\x93NUMPY");
    header[6] = 1;
    header[7] = 0;
    header[8..10].copy_from_slice(&((HEADER_LEN - 10) as u16).to_le_bytes());
    header[10..10 + dict.len()].copy_from_slice(dict.as_bytes());
    header[HEADER_LEN - 1] = b'\n';
    Ok(header)
}

fn check_overwrite(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() {
        if overwrite {
            fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        } else {
            bail!("{} already exists (use overwrite option)", path.display());
        }
    }
    Ok(())
}

/// Row-at-a-time writer for a 2D `u8` array backed by a memory-mapped file.
pub struct SequenceWriter {
    file: File,
    mmap: MmapMut,
    tmp_path: PathBuf,
    final_path: PathBuf,
    row_len: usize,
    capacity: usize,
    rows_written: usize,
}

impl SequenceWriter {
    /// Preallocate backing storage for up to `capacity` rows.
    pub fn create(
        final_path: &Path,
        capacity: usize,
        row_len: usize,
        overwrite: bool,
    ) -> Result<Self> {
        check_overwrite(final_path, overwrite)?;
        let tmp_path = final_path.with_extension("npy.tmp");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.set_len((HEADER_LEN + capacity * row_len) as u64)
            .with_context(|| format!("failed to size {}", tmp_path.display()))?;
        let mut mmap = unsafe { MmapMut::map_mut(&file) }
            .with_context(|| format!("failed to map {}", tmp_path.display()))?;
        mmap[..HEADER_LEN].copy_from_slice(&npy_header_2d_u8(capacity, row_len)?);
        Ok(Self {
            file,
            mmap,
            tmp_path,
            final_path: final_path.to_path_buf(),
            row_len,
            capacity,
            rows_written: 0,
        })
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn push_row(&mut self, row: &[u8]) -> Result<()> {
        if row.len() != self.row_len {
            bail!(
                "row has {} values, array holds rows of {}",
                row.len(),
                self.row_len
            );
        }
        if self.rows_written == self.capacity {
            bail!(
                "preallocated capacity of {} rows exceeded for {}",
                self.capacity,
                self.final_path.display()
            );
        }
        let start = HEADER_LEN + self.rows_written * self.row_len;
        self.mmap[start..start + self.row_len].copy_from_slice(row);
        self.rows_written += 1;
        Ok(())
    }

    /// Rewrite the header for the actual row count, truncate the backing
    /// file, and move it to its final name. Returns the row count.
    pub fn finish(self) -> Result<usize> {
        let Self {
            file,
            mut mmap,
            tmp_path,
            final_path,
            row_len,
            rows_written,
            ..
        } = self;
        mmap[..HEADER_LEN].copy_from_slice(&npy_header_2d_u8(rows_written, row_len)?);
        mmap.flush()
            .with_context(|| format!("failed to flush {}", tmp_path.display()))?;
        drop(mmap);
        file.set_len((HEADER_LEN + rows_written * row_len) as u64)
            .with_context(|| format!("failed to truncate {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", tmp_path.display()))?;
        drop(file);
        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!(
                "failed to rename {} -> {}",
                tmp_path.display(),
                final_path.display()
            )
        })?;
        Ok(rows_written)
    }
}

/// Read the `(rows, row_len)` shape of a 2D `.npy` file without loading data.
pub fn probe_2d(path: &Path) -> Result<(usize, usize)> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let npy =
        NpyFile::new(&mut reader).with_context(|| format!("failed to read {}", path.display()))?;
    let shape = npy.shape().to_vec();
    if shape.len() != 2 {
        bail!(
            "{} has shape {:?}, expected a 2D array",
            path.display(),
            shape
        );
    }
    Ok((shape[0] as usize, shape[1] as usize))
}

/// Stream every row of a 2D `u8` array into `writer`. Holds one row in
/// memory at a time; returns the number of rows copied.
pub fn append_rows_from(
    path: &Path,
    writer: &mut SequenceWriter,
    pb: Option<&ProgressBar>,
) -> Result<usize> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let npy =
        NpyFile::new(&mut reader).with_context(|| format!("failed to read {}", path.display()))?;
    let shape = npy.shape().to_vec();
    if shape.len() != 2 || shape[1] as usize != writer.row_len() {
        bail!(
            "{} has shape {:?}, expected (_, {})",
            path.display(),
            shape,
            writer.row_len()
        );
    }
    let rows = shape[0] as usize;
    let row_len = writer.row_len();
    let mut data = npy
        .data::<u8>()
        .map_err(|err| anyhow!("{}: {err}", path.display()))?;
    let mut row = vec![0u8; row_len];
    for _ in 0..rows {
        for slot in row.iter_mut() {
            *slot = data
                .next()
                .ok_or_else(|| anyhow!("{} ended mid-row", path.display()))?
                .with_context(|| format!("failed to decode {}", path.display()))?;
        }
        writer.push_row(&row)?;
        if let Some(pb) = pb {
            pb.inc(1);
        }
    }
    Ok(rows)
}

/// Load a full 2D `u8` array. Test and verification helper; prefer
/// [`append_rows_from`] for large arrays.
pub fn read_2d_u8(path: &Path) -> Result<(usize, usize, Vec<u8>)> {
    let (rows, row_len) = probe_2d(path)?;
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let npy =
        NpyFile::new(&mut reader).with_context(|| format!("failed to read {}", path.display()))?;
    let data = npy
        .into_vec::<u8>()
        .map_err(|err| anyhow!("{}: {err}", path.display()))?;
    Ok((rows, row_len, data))
}

/// Write a 1D `i32` array in one shot.
pub fn write_index_array(path: &Path, values: &[i32], overwrite: bool) -> Result<()> {
    check_overwrite(path, overwrite)?;
    let tmp = path.with_extension("npy.tmp");
    let file = BufWriter::new(
        File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?,
    );
    let mut writer = WriteOptions::new()
        .default_dtype()
        .shape(&[values.len() as u64])
        .writer(file)
        .begin_nd()?;
    writer.extend(values.iter().copied())?;
    writer.finish()?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Load a 1D `i32` array.
pub fn read_index_array(path: &Path) -> Result<Vec<i32>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let npy =
        NpyFile::new(&mut reader).with_context(|| format!("failed to read {}", path.display()))?;
    npy.into_vec::<i32>()
        .map_err(|err| anyhow!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sequence_writer_truncates_to_actual_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inputs.npy");
        let mut writer = SequenceWriter::create(&path, 10, 4, false).unwrap();
        writer.push_row(&[1, 2, 3, 4]).unwrap();
        writer.push_row(&[5, 6, 7, 8]).unwrap();
        writer.push_row(&[9, 10, 11, 12]).unwrap();
        assert_eq!(writer.finish().unwrap(), 3);

        let (rows, row_len, data) = read_2d_u8(&path).unwrap();
        assert_eq!((rows, row_len), (3, 4));
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(probe_2d(&path).unwrap(), (3, 4));
    }

    #[test]
    fn sequence_writer_rejects_capacity_overflow_and_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inputs.npy");
        let mut writer = SequenceWriter::create(&path, 1, 2, false).unwrap();
        assert!(writer.push_row(&[1, 2, 3]).is_err());
        writer.push_row(&[1, 2]).unwrap();
        assert!(writer.push_row(&[3, 4]).is_err());
    }

    #[test]
    fn unfinished_writer_leaves_no_final_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("inputs.npy");
        {
            let mut writer = SequenceWriter::create(&path, 2, 2, false).unwrap();
            writer.push_row(&[1, 2]).unwrap();
            // dropped without finish
        }
        assert!(!path.exists());
        assert!(path.with_extension("npy.tmp").exists());
    }

    #[test]
    fn overwrite_gate_applies_to_both_writers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arr.npy");
        write_index_array(&path, &[0, 1, 2], false).unwrap();
        assert!(write_index_array(&path, &[0], false).is_err());
        assert!(SequenceWriter::create(&path, 1, 1, false).is_err());
        write_index_array(&path, &[0, 5], true).unwrap();
        assert_eq!(read_index_array(&path).unwrap(), vec![0, 5]);
    }

    #[test]
    fn append_rows_streams_between_arrays() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.npy");
        let dst = dir.path().join("dst.npy");
        let mut writer = SequenceWriter::create(&src, 2, 3, false).unwrap();
        writer.push_row(&[1, 2, 3]).unwrap();
        writer.push_row(&[4, 5, 6]).unwrap();
        writer.finish().unwrap();

        let mut out = SequenceWriter::create(&dst, 4, 3, false).unwrap();
        assert_eq!(append_rows_from(&src, &mut out, None).unwrap(), 2);
        assert_eq!(append_rows_from(&src, &mut out, None).unwrap(), 2);
        out.finish().unwrap();
        let (rows, _, data) = read_2d_u8(&dst).unwrap();
        assert_eq!(rows, 4);
        assert_eq!(data[..3], [1, 2, 3]);
        assert_eq!(data[9..], [4, 5, 6]);
    }
}
