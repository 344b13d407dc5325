//! Size-capped log files.
//!
//! The live file is `{stem}.log`. When a write would push it past the size cap,
//! every segment moves one generation back (`{stem}.log` -> `{stem}.log.1`,
//! `{stem}.log.1` -> `{stem}.log.2`, ...) and segments past the retention
//! count are deleted.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

pub(crate) struct RotatingLog {
    dir: PathBuf,
    stem: String,
    /// Segments kept on disk, the live one included
    keep: usize,
    cap_bytes: u64,
    live: Option<File>,
    written: u64,
}

impl RotatingLog {
    pub(crate) fn open(
        dir: &Path,
        app_name: &str,
        keep: usize,
        cap_bytes: u64,
    ) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut log = Self {
            dir: dir.to_path_buf(),
            stem: file_stem(app_name),
            keep: keep.max(1),
            cap_bytes,
            live: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.cap_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    /// Path of segment `generation`; generation 0 is the live file.
    fn segment(&self, generation: usize) -> PathBuf {
        match generation {
            0 => self.dir.join(format!("{}.log", self.stem)),
            n => self.dir.join(format!("{}.log.{}", self.stem, n)),
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment(0))?;
        self.written = file.metadata()?.len();
        self.live = Some(file);
        Ok(())
    }

    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut live) = self.live.take() {
            live.flush().ok();
        }

        let last = self.keep - 1;
        remove_if_present(&self.segment(last))?;
        for generation in (0..last).rev() {
            let from = self.segment(generation);
            if from.exists() {
                fs::rename(&from, self.segment(generation + 1))?;
            }
        }

        self.reopen()
    }
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // An oversized event still goes into an empty live file.
        if self.written > 0 && self.written + buf.len() as u64 > self.cap_bytes {
            self.roll()?;
        }
        let live = match self.live.as_mut() {
            Some(file) => file,
            None => return Err(io::Error::other("log file is not open")),
        };
        let n = live.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.live.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Keep `[A-Za-z0-9_-]`, replace anything else with `_`.
pub(crate) fn file_stem(app_name: &str) -> String {
    app_name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// `MakeWriter` handing every event the same [`RotatingLog`].
#[derive(Clone)]
pub(crate) struct LogSink(Arc<Mutex<RotatingLog>>);

impl LogSink {
    pub(crate) fn new(log: RotatingLog) -> Self {
        Self(Arc::new(Mutex::new(log)))
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, RotatingLog>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log file mutex poisoned"))
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
