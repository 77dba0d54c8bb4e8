//! Subscriber setup for binaries. The library itself only emits `tracing`
//! events and never installs a global subscriber.

use crate::error::{PipelineError, Result};

use std::fmt;
use tracing::{Event, Level, Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// How each event is laid out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// `<target>\t<LEVEL>\t<message>`
    Tabbed,
    /// tracing-subscriber's default format
    #[default]
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogConfig {
    /// Default level, `RUST_LOG` takes precedence
    pub level: Level,
    pub format: LogFormat,
}

impl LogConfig {
    /// Verbose tab separated output used by the self test.
    pub fn test_run() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Tabbed,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
        }
    }
}

/// Event formatter writing `<target>\t<LEVEL>\t<fields>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TabbedFormat;

impl<S, N> FormatEvent<S, N> for TabbedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(writer, "{}\t{}\t", metadata.target(), metadata.level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Tabbed => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .event_format(TabbedFormat),
            )
            .try_init(),
        LogFormat::Full => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.map_err(|e| PipelineError::Logging(e.to_string()))
}
