//! The contract of filter stages.
use dcmanon_core::{InstanceSet, Tag};
use snafu::{Backtrace, Snafu};
use std::fmt;
use tracing::{error, info, warn};

/// The broad category of a filter stage,
/// which determines what the stage may do with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Reorders the instances of a set, returning exactly one set.
    Sorter,
    /// Partitions a set into one or more sets,
    /// keeping the relative order of the instances.
    Splitter,
    /// Removes, merges or rewrites instances arbitrarily.
    Custom,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterKind::Sorter => "sorter",
            FilterKind::Splitter => "splitter",
            FilterKind::Custom => "custom filter",
        })
    }
}

/// An error raised by a filter stage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum FilterError {
    /// An instance lacks an attribute which the stage needs.
    #[snafu(display("Instance #{} lacks required attribute {}", instance, tag))]
    MissingTag {
        /// the missing attribute
        tag: Tag,
        /// the position of the instance in the stage's input
        instance: usize,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// An attribute has a value which the stage cannot work with.
    #[snafu(display("Attribute {} of instance #{} has an unsupported value", tag, instance))]
    UnsupportedValue {
        /// the attribute
        tag: Tag,
        /// the position of the instance in the stage's input
        instance: usize,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// A stage was run without its required configuration.
    #[snafu(display("Filter `{}` was not configured", name))]
    NotConfigured {
        /// the name of the stage
        name: String,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// A stage produced a number of sets which its kind does not allow.
    #[snafu(display("{} `{}` produced {} instance sets", kind, name, count))]
    InvalidOutput {
        /// the name of the stage
        name: String,
        /// the kind of the stage
        kind: FilterKind,
        /// the number of sets produced
        count: usize,
        /// where the error was raised
        backtrace: Backtrace,
    },
    /// A stage nested in another stage failed
    /// on an instance which cannot be traced back to the outer input.
    #[snafu(display("Stage `{}` failed", stage))]
    Nested {
        /// the name of the failing stage
        stage: String,
        /// the error of the nested stage
        #[snafu(source(from(FilterError, Box::new)))]
        source: Box<FilterError>,
    },
    /// A custom stage failed on an instance.
    #[snafu(display("Stage `{}` failed on instance #{}", stage, instance))]
    Custom {
        /// the name of the failing stage
        stage: String,
        /// the position of the instance in the stage's input
        instance: usize,
        /// the underlying error
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl FilterError {
    /// The position of the instance which caused the failure
    /// in the input of the failing stage, if the failure is
    /// attributable to a single instance.
    pub fn instance(&self) -> Option<usize> {
        match self {
            FilterError::MissingTag { instance, .. }
            | FilterError::UnsupportedValue { instance, .. }
            | FilterError::Custom { instance, .. } => Some(*instance),
            _ => None,
        }
    }
}

/// Type alias for the result of a filter stage.
pub type Result<T, E = FilterError> = std::result::Result<T, E>;

/// The severity of a filter log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// informative
    Info,
    /// something was not as expected, but the stage went on
    Warning,
    /// an instance or set could not be processed
    Error,
}

/// A message recorded by a filter stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// the severity
    pub level: LogLevel,
    /// the name of the stage which recorded the entry
    pub stage: String,
    /// the message
    pub message: String,
}

/// Messages recorded by the stages of a pipeline run.
///
/// Every entry is also emitted as a `tracing` event.
#[derive(Debug, Default, Clone)]
pub struct FilterLog {
    entries: Vec<LogEntry>,
}

impl FilterLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an informative message.
    pub fn info(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        info!(stage, "{}", message);
        self.push(LogLevel::Info, stage, message);
    }

    /// Record a warning.
    pub fn warning(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(stage, "{}", message);
        self.push(LogLevel::Warning, stage, message);
    }

    /// Record an error.
    pub fn error(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        error!(stage, "{}", message);
        self.push(LogLevel::Error, stage, message);
    }

    fn push(&mut self, level: LogLevel, stage: &str, message: String) {
        self.entries.push(LogEntry {
            level,
            stage: stage.to_string(),
            message,
        });
    }

    /// All entries, in the order they were recorded.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The entries of at least the given severity.
    pub fn at_least(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter().filter(move |e| e.level >= level)
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A transformation stage over instance sets.
///
/// A stage takes ownership of one instance set and returns
/// the sets it produced. What it may produce depends on its [kind](FilterKind).
/// A stage instance processes one set at a time,
/// but distinct stage instances can run concurrently.
pub trait Filter: fmt::Debug + Send {
    /// A short human readable name.
    fn name(&self) -> &str;

    /// A human readable description of what the stage does.
    fn description(&self) -> &str;

    /// The kind of the stage.
    fn kind(&self) -> FilterKind;

    /// Whether the stage needs parameters before it can run meaningfully.
    fn is_configuration_required(&self) -> bool {
        false
    }

    /// Apply the stage to an instance set.
    ///
    /// Fails if an instance lacks an attribute which the stage needs.
    /// The failure names the offending instance,
    /// so that the caller can decide to leave it out and try again.
    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>>;
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn description(&self) -> &str {
        (**self).description()
    }

    fn kind(&self) -> FilterKind {
        (**self).kind()
    }

    fn is_configuration_required(&self) -> bool {
        (**self).is_configuration_required()
    }

    fn apply(&mut self, set: InstanceSet, log: &mut FilterLog) -> Result<Vec<InstanceSet>> {
        (**self).apply(set, log)
    }
}

/// Check that a stage produced what its kind allows.
pub(crate) fn check_output(stage: &dyn Filter, output: &[InstanceSet]) -> Result<()> {
    let count = output.len();
    let valid = match stage.kind() {
        FilterKind::Sorter => count == 1,
        FilterKind::Splitter => count >= 1,
        FilterKind::Custom => true,
    };
    snafu::ensure!(
        valid,
        InvalidOutputSnafu {
            name: stage.name(),
            kind: stage.kind(),
            count,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_records_and_filters_by_level() {
        let mut log = FilterLog::new();
        assert!(log.is_empty());
        log.info("sorter", "sorted 3 instances");
        log.warning("splitter", "empty value");
        log.error("splitter", "instance skipped");
        assert_eq!(log.entries().len(), 3);
        let serious: Vec<_> = log.at_least(LogLevel::Warning).map(|e| e.message.as_str()).collect();
        assert_eq!(serious, vec!["empty value", "instance skipped"]);
    }

    #[test]
    fn errors_name_their_instance() {
        let e = MissingTagSnafu {
            tag: Tag(0x0008, 0x0016),
            instance: 2_usize,
        }
        .build();
        assert_eq!(e.instance(), Some(2));
        assert_eq!(e.to_string(), "Instance #2 lacks required attribute (0008,0016)");
        let nested = FilterError::Nested {
            stage: "inner".into(),
            source: Box::new(e),
        };
        assert_eq!(nested.instance(), None);
    }
}
