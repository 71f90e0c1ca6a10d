//! Structured-record sinks: destination, format and minimum level in one value.
//!
//! A [`Sink`] wraps a [`tracing::Dispatch`]. Records are sent to it with
//! [`tracing::dispatcher::with_default`], so a sink works the same whether or
//! not the application installed a global subscriber, and two sinks never see
//! each other's records.
//!
//! Write errors are swallowed by the subscriber; a broken log destination
//! never reaches the response.

use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Output format of a [`Sink`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    /// `key=value` lines.
    #[default]
    Text,
    /// One JSON object per line, fields at the top level.
    Json,
}

/// Where and how records are written.
#[derive(Clone, Debug)]
pub struct Sink {
    dispatch: Dispatch,
}

impl Sink {
    pub fn builder() -> SinkBuilder {
        SinkBuilder::default()
    }

    /// Uses a caller-built subscriber, e.g. one with extra layers.
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Text records on stdout, level and target stripped.
    pub fn stdout() -> Self {
        Self::builder().strip_level(true).build(std::io::stdout)
    }

    /// Text records on stderr at `ERROR` and above.
    pub fn stderr() -> Self {
        Self::builder().level(LevelFilter::ERROR).build(std::io::stderr)
    }

    /// Runs `f` with this sink as the thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}

/// Builder for [`Sink`].
///
/// ```rust
/// use reqlog::middleware::{Format, Sink};
/// use tracing::level_filters::LevelFilter;
///
/// let sink = Sink::builder()
///     .format(Format::Json)
///     .level(LevelFilter::WARN)
///     .build(std::io::stderr);
/// # let _ = sink;
/// ```
#[derive(Clone, Copy, Debug)]
pub struct SinkBuilder {
    format: Format,
    level: LevelFilter,
    strip_level: bool,
}

impl Default for SinkBuilder {
    fn default() -> Self {
        Self { format: Format::Text, level: LevelFilter::INFO, strip_level: false }
    }
}

impl SinkBuilder {
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Records below `level` are dropped.
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// Leave the level out of each record (access logs have only one).
    pub fn strip_level(mut self, strip: bool) -> Self {
        self.strip_level = strip;
        self
    }

    /// Finishes the sink, writing to `writer`: `std::io::stdout`, a file
    /// behind a mutex, or any other [`MakeWriter`].
    pub fn build<W>(self, writer: W) -> Sink
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let builder = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_max_level(self.level)
            .with_level(!self.strip_level)
            .with_target(false)
            .with_ansi(false);

        let dispatch = match self.format {
            Format::Text => Dispatch::new(builder.finish()),
            Format::Json => Dispatch::new(builder.json().flatten_event(true).finish()),
        };
        Sink { dispatch }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Shared in-memory log destination.
    #[derive(Clone, Default)]
    pub(crate) struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }

        /// Every line parsed as JSON.
        pub(crate) fn records(&self) -> Vec<serde_json::Value> {
            self.contents()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Capture;
    use super::*;

    #[test]
    fn level_filter_applies() {
        let out = Capture::default();
        let sink = Sink::builder().format(Format::Json).level(LevelFilter::ERROR).build(out.clone());

        sink.in_scope(|| {
            tracing::info!("dropped");
            tracing::error!("kept");
        });

        let records = out.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["message"], "kept");
        assert_eq!(records[0]["level"], "ERROR");
    }

    #[test]
    fn strip_level_removes_the_level() {
        let out = Capture::default();
        let sink = Sink::builder().format(Format::Json).strip_level(true).build(out.clone());

        sink.in_scope(|| tracing::info!(answer = 42, "hello"));

        let records = out.records();
        assert_eq!(records[0]["answer"], 42);
        assert!(records[0].get("level").is_none());
        assert!(records[0].get("target").is_none());
    }

    #[test]
    fn text_format_writes_key_values() {
        let out = Capture::default();
        let sink = Sink::builder().build(out.clone());

        sink.in_scope(|| tracing::info!(remote_ip = "10.0.0.1", "hi"));

        let line = out.contents();
        assert!(line.contains("remote_ip=\"10.0.0.1\""), "{line}");
        assert!(line.contains("INFO"), "{line}");
    }

    #[test]
    fn sinks_are_isolated() {
        let a = Capture::default();
        let b = Capture::default();
        let sink_a = Sink::builder().build(a.clone());
        let _sink_b = Sink::builder().build(b.clone());

        sink_a.in_scope(|| tracing::warn!("only a"));

        assert!(a.contents().contains("only a"));
        assert!(b.contents().is_empty());
    }
}
