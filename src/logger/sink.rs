//! # Destino de Logs en Archivo
//! src/logger/sink.rs
//!
//! `LogSink` implementa `MakeWriter` para la capa `fmt` de
//! `tracing_subscriber`. Cada evento formateado llega como una línea.
//!
//! ## Modos
//!
//! - **Sincrónico**: la línea se escribe en el archivo bajo un mutex
//! - **Asíncrono**: la línea se encola en una `BlockQueue<String>` y un
//!   thread "log-flush" la escribe. Con la cola llena se escribe directo.
//!
//! ## Rotación
//!
//! `<dir>/<YYYY>_<MM>_<DD>_<nombre>`; se abre un archivo nuevo cuando cambia
//! el día (UTC) o cada `split_lines` líneas (`..._<nombre>.<n>`).

use crate::sync::{lock, BlockQueue};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::fmt::MakeWriter;

const SECS_PER_DAY: u64 = 86_400;

/// Archivo de log abierto y su estado de rotación
#[derive(Debug)]
struct LogFile {
    dir: PathBuf,
    name: String,
    split_lines: usize,
    day: u64,
    count: usize,
    out: BufWriter<File>,
}

impl LogFile {
    fn open(path: &Path, split_lines: usize) -> io::Result<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?
            .to_string();

        fs::create_dir_all(&dir)?;
        let day = current_day();
        let out = Self::create(&dated_path(&dir, &name, day, None))?;

        Ok(Self {
            dir,
            name,
            split_lines: split_lines.max(1),
            day,
            count: 0,
            out,
        })
    }

    fn create(path: &Path) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.rotate_if_needed(current_day())?;
        self.count += 1;
        self.out.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Cambia de archivo al cambiar el día o al llenar `split_lines`
    fn rotate_if_needed(&mut self, today: u64) -> io::Result<()> {
        let new_day = today != self.day;
        let full = self.count > 0 && self.count % self.split_lines == 0;
        if !new_day && !full {
            return Ok(());
        }

        self.out.flush()?;
        let path = if new_day {
            self.day = today;
            self.count = 0;
            dated_path(&self.dir, &self.name, today, None)
        } else {
            dated_path(&self.dir, &self.name, today, Some(self.count / self.split_lines))
        };
        self.out = Self::create(&path)?;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Días desde 1970-01-01 (UTC)
fn current_day() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / SECS_PER_DAY)
        .unwrap_or(0)
}

/// Fecha civil (año, mes, día) para un número de días desde 1970-01-01
fn civil_from_days(days: u64) -> (i64, u32, u32) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn dated_path(dir: &Path, name: &str, day: u64, part: Option<usize>) -> PathBuf {
    let (year, month, dom) = civil_from_days(day);
    let base = format!("{:04}_{:02}_{:02}_{}", year, month, dom, name);
    match part {
        Some(n) => dir.join(format!("{}.{}", base, n)),
        None => dir.join(base),
    }
}

struct SinkInner {
    file: Mutex<LogFile>,
    queue: Option<BlockQueue<String>>,
}

impl SinkInner {
    fn write_direct(&self, line: &str) {
        let mut file = lock(&self.file);
        if let Err(e) = file.write_line(line) {
            // El logger no puede loguear sus propios errores
            eprintln!("log write failed: {}", e);
        }
    }
}

/// Destino de logs compartible entre threads
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

impl LogSink {
    /// Abre `path` para escritura
    ///
    /// `queue_capacity == 0` elige el modo sincrónico.
    pub fn open(path: &Path, queue_capacity: usize, split_lines: usize) -> io::Result<Self> {
        let file = LogFile::open(path, split_lines)?;
        let queue = (queue_capacity > 0).then(|| BlockQueue::new(queue_capacity));
        Ok(Self {
            inner: Arc::new(SinkInner {
                file: Mutex::new(file),
                queue,
            }),
        })
    }

    pub fn is_async(&self) -> bool {
        self.inner.queue.is_some()
    }

    /// Entrega una línea: a la cola si hay lugar, si no directo al archivo
    pub fn submit(&self, line: String) {
        if let Some(queue) = &self.inner.queue {
            if let Err(line) = queue.push(line) {
                self.inner.write_direct(&line);
            }
        } else {
            self.inner.write_direct(&line);
        }
    }

    /// Arranca el thread que vacía la cola (solo en modo asíncrono)
    pub fn spawn_flusher(&self) -> io::Result<Option<JoinHandle<()>>> {
        if self.inner.queue.is_none() {
            return Ok(None);
        }
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("log-flush".to_string())
            .spawn(move || {
                if let Some(queue) = &inner.queue {
                    while let Some(line) = queue.pop() {
                        inner.write_direct(&line);
                    }
                }
            })?;
        Ok(Some(handle))
    }

    /// Cierra la cola, escribe lo que quedó encolado y hace flush
    pub fn stop(&self) {
        if let Some(queue) = &self.inner.queue {
            queue.close();
            for line in queue.drain() {
                self.inner.write_direct(&line);
            }
        }
        self.flush();
    }

    pub fn flush(&self) {
        if let Err(e) = lock(&self.inner.file).flush() {
            eprintln!("log flush failed: {}", e);
        }
    }
}

/// Writer de un solo evento; la línea se entrega al soltarlo
pub struct LineWriter {
    sink: LogSink,
    buf: Vec<u8>,
}

impl Write for LineWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            self.sink.submit(line);
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            sink: self.clone(),
            buf: Vec::with_capacity(256),
        }
    }
}
