//! Logging Module
//!
//! Structured logging through the `tracing` crate, plus small progress
//! reporters used by the training and prediction stages.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::format_duration;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Create a quiet logging config (errors only)
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name; unknown names fall back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Progress logger for long-running, non-epoch operations
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    /// Log every N items
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    /// Create a new progress logger
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Update progress
    pub fn update(&mut self, count: usize) {
        self.current = count;

        if self.current % self.log_interval == 0 || self.current == self.total {
            let percentage = 100.0 * self.current as f64 / self.total.max(1) as f64;
            tracing::debug!(
                "{}: {}/{} ({:.1}%) after {}",
                self.operation,
                self.current,
                self.total,
                percentage,
                format_duration(self.start_time.elapsed())
            );
        }
    }

    /// Log completion
    pub fn finish(&self) {
        tracing::info!(
            "{}: completed {} items in {}",
            self.operation,
            self.current,
            format_duration(self.start_time.elapsed())
        );
    }
}

/// Epoch-level training logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    /// Create a new training logger
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with its metrics
    pub fn end_epoch(&self, loss: f64, accuracy: f64, val_loss: f64, val_accuracy: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let eta = total_time.mul_f64(epochs_remaining as f64 / (self.epoch + 1) as f64);

        tracing::info!(
            "Epoch {}/{} - {} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4} | ETA: {}",
            self.epoch + 1,
            self.total_epochs,
            format_duration(epoch_time),
            loss,
            accuracy,
            val_loss,
            val_accuracy,
            format_duration(eta)
        );
    }

    /// Log training completion
    pub fn log_complete(&self, epochs_run: usize, best_val_loss: f64) {
        tracing::info!(
            "Training complete! {} epochs in {} | Best val_loss: {:.4}",
            epochs_run,
            format_duration(self.training_start.elapsed()),
            best_val_loss
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
        assert_eq!(LogConfig::quiet().level, LogLevel::Error);
    }

    #[test]
    fn test_progress_logger() {
        let mut logger = ProgressLogger::new("Predicting", 100);
        logger.update(50);
        assert_eq!(logger.current, 50);
    }
}
