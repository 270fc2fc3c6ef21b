//! Time/iteration-gated, non-blocking parameter checkpoints.
//!
//! A dump snapshots the parameter under the caller's lock and hands the
//! copy to a blocking task; at most one flush is in flight, enforced with
//! a flag. Mid-run write failures are logged and training continues.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Read, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use log::warn;
use parking_lot::Mutex;

/// One archived record.
pub type Record = (i64, f64, Vec<f64>);

pub struct Archiver {
    inner: Option<Arc<Inner>>,
    arv_iter: u64,
    arv_time: f64,
    last_iter: AtomicU64,
    tmr: Mutex<Instant>,
}

struct Inner {
    writer: Mutex<BufWriter<File>>,
    doing: AtomicBool,
    binary: bool,
}

impl Archiver {
    /// An archiver that gates everything off.
    pub fn disabled() -> Self {
        Self {
            inner: None,
            arv_iter: u64::MAX,
            arv_time: f64::MAX,
            last_iter: AtomicU64::new(0),
            tmr: Mutex::new(Instant::now()),
        }
    }

    /// Opens the archive for writing, appending when resuming.
    ///
    /// # Errors
    /// Failure to open the file; the caller treats this as fatal.
    pub fn open(
        path: &Path,
        binary: bool,
        resume: bool,
        arv_iter: u64,
        arv_time: f64,
    ) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(resume)
            .write(true)
            .truncate(!resume)
            .open(path)?;

        Ok(Self {
            inner: Some(Arc::new(Inner {
                writer: Mutex::new(BufWriter::new(file)),
                doing: AtomicBool::new(false),
                binary,
            })),
            arv_iter: arv_iter.max(1),
            arv_time,
            last_iter: AtomicU64::new(0),
            tmr: Mutex::new(Instant::now()),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether the gating policy asks for a checkpoint at `iter`.
    pub fn need(&self, iter: u64) -> bool {
        if self.inner.is_none() {
            return false;
        }
        iter.saturating_sub(self.last_iter.load(Ordering::Relaxed)) >= self.arv_iter
            || self.tmr.lock().elapsed().as_secs_f64() >= self.arv_time
    }

    /// Starts a background flush of one record.
    ///
    /// Skipped while a previous flush is still running.
    ///
    /// # Returns
    /// Whether a flush was started.
    pub fn dump(&self, iter: u64, time: f64, params: Vec<f64>) -> bool {
        let Some(inner) = &self.inner else {
            return false;
        };
        if inner
            .doing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        self.last_iter.store(iter, Ordering::Relaxed);
        *self.tmr.lock() = Instant::now();

        let inner = Arc::clone(inner);
        tokio::task::spawn_blocking(move || {
            let mut writer = inner.writer.lock();
            let ret = if inner.binary {
                write_binary(&mut *writer, iter as i64, time, &params)
            } else {
                write_text(&mut *writer, iter as i64, time, &params)
            };
            if let Err(e) = ret.and_then(|()| writer.flush()) {
                warn!("archive write failed at iteration {iter}: {e}");
            }
            drop(writer);
            inner.doing.store(false, Ordering::Release);
        });

        true
    }

    /// Waits for the in-flight flush, if any, and syncs the file.
    pub async fn close(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        while inner.doing.load(Ordering::Acquire) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        if let Err(e) = inner.writer.lock().flush() {
            warn!("archive flush on close failed: {e}");
        }
    }
}

fn write_text<W: Write>(w: &mut W, iter: i64, time: f64, params: &[f64]) -> io::Result<()> {
    write!(w, "{iter} {time}")?;
    for p in params {
        write!(w, " {p}")?;
    }
    writeln!(w)
}

fn write_binary<W: Write>(w: &mut W, iter: i64, time: f64, params: &[f64]) -> io::Result<()> {
    w.write_all(&iter.to_le_bytes())?;
    w.write_all(&time.to_le_bytes())?;
    for p in params {
        w.write_all(&p.to_le_bytes())?;
    }
    Ok(())
}

/// Reads the last complete record of a previous run.
///
/// A truncated or garbled tail is skipped; earlier intact records still
/// resume.
///
/// # Errors
/// Failure to read the file itself.
pub fn load_last(path: &Path, width: usize, binary: bool) -> io::Result<Option<Record>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    let last = if binary {
        last_binary(&bytes, width)
    } else {
        last_text(&bytes, width)
    };
    Ok(last)
}

fn last_text(bytes: &[u8], width: usize) -> Option<Record> {
    let text = String::from_utf8_lossy(bytes);
    text.lines().rev().find_map(|line| {
        let mut fields = line.split_whitespace();
        let iter: i64 = fields.next()?.parse().ok()?;
        let time: f64 = fields.next()?.parse().ok()?;
        let params: Vec<f64> = fields.map(str::parse).collect::<Result<_, _>>().ok()?;
        (params.len() == width).then_some((iter, time, params))
    })
}

fn last_binary(bytes: &[u8], width: usize) -> Option<Record> {
    let record_len = 16 + 8 * width;
    let complete = bytes.len() / record_len;
    if complete == 0 {
        return None;
    }
    let rec = &bytes[(complete - 1) * record_len..complete * record_len];

    let iter = i64::from_le_bytes(rec[..8].try_into().unwrap());
    let time = f64::from_le_bytes(rec[8..16].try_into().unwrap());
    let params = rec[16..]
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    Some((iter, time, params))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const PARAMS: [f64; 3] = [0.5, -1.25, 3.0];

    #[tokio::test]
    async fn test_text_roundtrip_keeps_last_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");

        let arch = Archiver::open(&path, false, false, 1, f64::MAX).unwrap();
        assert!(arch.dump(1, 0.5, vec![0.0; 3]));
        arch.close().await;
        assert!(arch.dump(2, 1.5, PARAMS.to_vec()));
        arch.close().await;

        let (iter, time, params) = load_last(&path, 3, false).unwrap().unwrap();
        assert_eq!(iter, 2);
        assert_eq!(time, 1.5);
        assert_eq!(params, PARAMS);
    }

    #[tokio::test]
    async fn test_binary_roundtrip_skips_truncated_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.bin");

        let arch = Archiver::open(&path, true, false, 1, f64::MAX).unwrap();
        assert!(arch.dump(7, 2.0, PARAMS.to_vec()));
        arch.close().await;

        // simulate a crash mid-record
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[1, 2, 3]);
        fs::write(&path, &bytes).unwrap();

        let (iter, time, params) = load_last(&path, 3, true).unwrap().unwrap();
        assert_eq!(iter, 7);
        assert_eq!(time, 2.0);
        assert_eq!(params, PARAMS);
    }

    #[tokio::test]
    async fn test_gating_by_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");

        let arch = Archiver::open(&path, false, false, 10, f64::MAX).unwrap();
        assert!(arch.dump(1, 0.0, PARAMS.to_vec()));
        assert!(!arch.need(5));
        assert!(arch.need(11));
        arch.close().await;
    }

    #[test]
    fn test_disabled_never_needs() {
        let arch = Archiver::disabled();
        assert!(!arch.need(u64::MAX));
        assert!(!arch.dump(1, 0.0, vec![]));
    }

    #[tokio::test]
    async fn test_resume_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.txt");

        let arch = Archiver::open(&path, false, false, 1, f64::MAX).unwrap();
        assert!(arch.dump(1, 0.0, PARAMS.to_vec()));
        arch.close().await;
        drop(arch);

        let arch = Archiver::open(&path, false, true, 1, f64::MAX).unwrap();
        assert!(arch.dump(2, 1.0, PARAMS.to_vec()));
        arch.close().await;

        let (iter, ..) = load_last(&path, 3, false).unwrap().unwrap();
        assert_eq!(iter, 2);
        let lines = fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines, 2);
    }
}
