use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::debug::json_escape;

/// Span-timing log for the flatten/certificate/merge stages, one JSON line
/// per completed span. Optional, builder-injected.
#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    pub fn log_span_ms(&self, name: &str, doc_ref: Option<&str>, ms: f64) {
        let doc = doc_ref
            .map(|v| format!("\"{}\"", json_escape(v)))
            .unwrap_or_else(|| "null".to_string());
        let json = format!(
            "{{\"type\":\"perf.span\",\"name\":\"{}\",\"doc_ref\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            json_escape(name),
            doc,
            ms
        );
        if let Ok(mut writer) = self.inner.lock() {
            let _ = writeln!(writer, "{json}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut writer) = self.inner.lock() {
            let _ = writer.flush();
        }
    }
}

/// Times a stage and reports it to an optional perf logger on drop.
pub(crate) struct Span<'a> {
    logger: Option<&'a PerfLogger>,
    name: &'a str,
    doc_ref: Option<&'a str>,
    started: Instant,
}

impl<'a> Span<'a> {
    pub fn start(logger: Option<&'a PerfLogger>, name: &'a str, doc_ref: Option<&'a str>) -> Self {
        Self {
            logger,
            name,
            doc_ref,
            started: Instant::now(),
        }
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if let Some(logger) = self.logger {
            let ms = self.started.elapsed().as_secs_f64() * 1000.0;
            logger.log_span_ms(self.name, self.doc_ref, ms);
        }
    }
}
