//! Progress bars for the long-running passes, and a log writer that prints
//! above them instead of tearing through.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

pub fn add_progress_bar(len: u64) -> ProgressBar {
    multi_progress().add(ProgressBar::new(len))
}

/// A bar for a pass over `len` items. Nothing to do means no bar.
pub fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let pb = add_progress_bar(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

pub fn advance_progress(pb: &Option<ProgressBar>, delta: u64) {
    if let Some(pb) = pb {
        pb.inc(delta);
    }
}

pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

fn print_line(line: &str) {
    write_line(multi_progress(), &mut io::stderr(), line);
}

/// A hidden target (stderr is not a terminal) swallows `println`, so the
/// line goes straight to `fallback` instead.
fn write_line(mp: &MultiProgress, fallback: &mut impl Write, line: &str) {
    let line = line.trim_end_matches('\r');
    if mp.is_hidden() {
        let _ = writeln!(fallback, "{}", line);
    } else {
        let _ = mp.println(line);
    }
}

/// `tracing` writer factory routing every log line through the progress bars
#[derive(Default, Clone)]
pub struct LogWriterFactory;

pub struct LogWriter {
    buffer: String,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));

        while let Some(idx) = self.buffer.find('\n') {
            print_line(&self.buffer[..idx]);
            self.buffer.drain(..=idx);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            print_line(self.buffer.trim_end_matches('\n'));
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            buffer: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_target_still_prints_logs() {
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let mut out = Vec::new();

        write_line(&mp, &mut out, "Importing history from 2 source(s)\r");
        write_line(&mp, &mut out, "done");

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Importing history from 2 source(s)\ndone\n"
        );
    }

    #[test]
    fn test_progress_bar_skipped_for_empty_pass() {
        assert!(start_progress_bar(0, "Scraping").is_none());
    }
}
