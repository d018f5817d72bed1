//! Centralized logging configuration for the emulator.
//!
//! Every component logs through [`log`], tagged with a [`LogCategory`] and a
//! [`LogLevel`]. Levels can be set globally or per category, and a category
//! level (when not `Off`) always wins over the global one.
//!
//! # Architecture
//!
//! - **LogConfig**: Thread-safe global configuration using atomic operations
//! - **LogLevel**: Hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: Peripheral-bus categories (Bus, Devices, Interrupts, Timing, SaveState, Stubs, Config)
//! - **log()**: Common logging function for all output with async file I/O
//!
//! # Performance
//!
//! The serial bus logs on every byte it moves, so logging must stay cheap:
//! - Messages are built lazily, only when the category/level is enabled
//! - Each category is rate limited (sliding one second window)
//! - File output is handed to a background thread over a channel
//!
//! # Usage
//!
//! ```rust
//! use emu_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Bus, LogLevel::Debug, || {
//!     format!("JOY_CTRL <- {:04X}", 0x1003)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Number of log categories (size of the per-category tables)
const CATEGORY_COUNT: usize = 7;

/// Log category for the peripheral bus components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Serial bus register reads/writes and transfer lifecycle
    Bus,
    /// Per-byte device protocol traffic (controllers, memory cards, multitap)
    Devices,
    /// Interrupt requests raised towards the interrupt controller
    Interrupts,
    /// Timing event scheduling
    Timing,
    /// Save state writing/restoring
    SaveState,
    /// Unimplemented features, undefined registers
    Stubs,
    /// Loading configuration and settings files
    Config,
}

impl LogCategory {
    /// All categories, in table order
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Bus,
        LogCategory::Devices,
        LogCategory::Interrupts,
        LogCategory::Timing,
        LogCategory::SaveState,
        LogCategory::Stubs,
        LogCategory::Config,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Bus => 0,
            LogCategory::Devices => 1,
            LogCategory::Interrupts => 2,
            LogCategory::Timing => 3,
            LogCategory::SaveState => 4,
            LogCategory::Stubs => 5,
            LogCategory::Config => 6,
        }
    }
}

/// Sliding-window bookkeeping for one category
#[derive(Default)]
struct WindowState {
    timestamps: VecDeque<Instant>,
    dropped: usize,
    last_drop_report: Option<Instant>,
}

/// Rate limiter for controlling log output frequency per category
struct RateLimiter {
    /// Maximum logs allowed per second (atomic for dynamic updates)
    max_logs_per_second: AtomicUsize,
    window_duration: Duration,
    windows: Mutex<[WindowState; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_logs_per_second: usize) -> Self {
        Self {
            max_logs_per_second: AtomicUsize::new(max_logs_per_second),
            window_duration: Duration::from_secs(1),
            windows: Mutex::new(Default::default()),
        }
    }

    fn set_max_logs_per_second(&self, max: usize) {
        self.max_logs_per_second.store(max, Ordering::Relaxed);
    }

    fn get_max_logs_per_second(&self) -> usize {
        self.max_logs_per_second.load(Ordering::Relaxed)
    }

    fn windows(&self) -> MutexGuard<'_, [WindowState; CATEGORY_COUNT]> {
        // A panic while holding the lock leaves plain counters behind, still usable.
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if a log should be allowed based on rate limits.
    /// Returns (allowed, dropped_count) where dropped_count is Some(n) if drops should be reported.
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let max_logs = self.get_max_logs_per_second();
        let mut windows = self.windows();
        let window = &mut windows[category.index()];

        while let Some(&front) = window.timestamps.front() {
            if now.duration_since(front) > self.window_duration {
                window.timestamps.pop_front();
            } else {
                break;
            }
        }

        if window.timestamps.len() < max_logs {
            window.timestamps.push_back(now);
            if window.dropped > 0 {
                let dropped = std::mem::take(&mut window.dropped);
                window.last_drop_report = Some(now);
                return (true, Some(dropped));
            }
            return (true, None);
        }

        window.dropped += 1;
        let should_report = match window.last_drop_report {
            None => true,
            Some(last) => now.duration_since(last) >= self.window_duration,
        };
        if should_report {
            let dropped = std::mem::take(&mut window.dropped);
            window.last_drop_report = Some(now);
            (false, Some(dropped))
        } else {
            (false, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Global log level (applies to all categories unless overridden)
    global_level: AtomicU8,
    /// Per-category overrides, indexed by `LogCategory::index`
    category_levels: [AtomicU8; CATEGORY_COUNT],
    /// Channel for sending log messages to the background writer thread
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// Create a new LogConfig with all logging disabled and default rate limit (60 logs/second)
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    /// Get log level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// Check if a message should be logged for the given category and level
    ///
    /// Returns true if:
    /// 1. The category-specific level is set and >= the message level, OR
    /// 2. The category-specific level is Off AND the global level >= the message level
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Apply a filter string such as `"warn,bus=trace,devices=debug"`.
    ///
    /// A bare level sets the global level; `category=level` pairs set
    /// category overrides. Unknown entries are skipped and returned so the
    /// caller can report them.
    pub fn apply_filter(&self, filter: &str) -> Vec<String> {
        let mut rejected = Vec::new();
        for entry in filter.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                None => match LogLevel::from_str(entry) {
                    Some(level) => self.set_global_level(level),
                    None => rejected.push(entry.to_string()),
                },
                Some((name, level)) => {
                    let category = match name.trim().to_lowercase().as_str() {
                        "bus" => Some(LogCategory::Bus),
                        "devices" | "device" => Some(LogCategory::Devices),
                        "interrupts" | "irq" => Some(LogCategory::Interrupts),
                        "timing" => Some(LogCategory::Timing),
                        "savestate" | "state" => Some(LogCategory::SaveState),
                        "stubs" => Some(LogCategory::Stubs),
                        "config" | "settings" => Some(LogCategory::Config),
                        _ => None,
                    };
                    match (category, LogLevel::from_str(level.trim())) {
                        (Some(category), Some(level)) => self.set_level(category, level),
                        _ => rejected.push(entry.to_string()),
                    }
                }
            }
        }
        rejected
    }

    /// Set the maximum logs per second per category (rate limit)
    pub fn set_rate_limit(&self, max_logs_per_second: usize) {
        self.rate_limiter
            .set_max_logs_per_second(max_logs_per_second);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.get_max_logs_per_second()
    }

    /// Set the log file path
    ///
    /// Starts a background thread for file I/O. Any previous writer thread
    /// stops once its sender is replaced.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                while let Ok(message) = receiver.recv() {
                    // Logging must never take the emulator down.
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
                let _ = file.flush();
            })?;

        *self.sender() = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop logging to file (the writer thread exits when its sender drops)
    pub fn clear_log_file(&self) {
        *self.sender() = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
    }

    fn sender(&self) -> MutexGuard<'_, Option<Sender<String>>> {
        self.log_sender.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write a message to the configured output (file or stderr)
    fn write_message(&self, message: &str) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            if let Some(sender) = self.sender().as_ref() {
                if sender.send(message.to_string()).is_ok() {
                    return;
                }
            }
        }
        eprintln!("{}", message);
    }
}

/// Log a message with the specified category and level
///
/// The message is lazily evaluated via a closure, so formatting only occurs
/// when logging is actually enabled for the given category and level.
///
/// # Rate Limiting
///
/// Each category is limited to the configured number of messages per second
/// (60 by default). Dropped messages are summarized by a periodic warning.
///
/// # Examples
///
/// ```rust
/// use emu_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Devices, LogLevel::Trace, || {
///     format!("pad: 0x{:02X} -> 0x{:02X}", 0x01, 0xFF)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped_count) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped_count.filter(|&c| c > 0) {
        config.write_message(&format!(
            "[{:?}] WARNING: Rate limit exceeded, {} log message(s) dropped in the last second",
            category, count
        ));
    }

    if allowed {
        config.write_message(&format!("[{:?}] {}", category, message_fn()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("3"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("Debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("verbose"), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::Devices, LogLevel::Trace);

        assert!(config.should_log(LogCategory::Devices, LogLevel::Trace));
        assert!(!config.should_log(LogCategory::Bus, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Bus, LogLevel::Error));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Timing, LogLevel::Debug);

        config.reset();

        assert_eq!(config.get_global_level(), LogLevel::Off);
        for category in LogCategory::ALL {
            assert_eq!(config.get_level(category), LogLevel::Off);
        }
    }

    #[test]
    fn test_apply_filter() {
        let config = LogConfig::new();
        let rejected = config.apply_filter("warn, bus=trace,irq=debug,gpu=info,savestate=nope");

        assert_eq!(config.get_global_level(), LogLevel::Warn);
        assert_eq!(config.get_level(LogCategory::Bus), LogLevel::Trace);
        assert_eq!(config.get_level(LogCategory::Interrupts), LogLevel::Debug);
        assert_eq!(config.get_level(LogCategory::SaveState), LogLevel::Off);
        assert_eq!(rejected, vec!["gpu=info".to_string(), "savestate=nope".to_string()]);
    }

    #[test]
    fn test_apply_filter_config_category() {
        let config = LogConfig::new();
        assert!(config.apply_filter("settings=warn").is_empty());
        assert_eq!(config.get_level(LogCategory::Config), LogLevel::Warn);
        assert_eq!(config.get_level(LogCategory::Stubs), LogLevel::Off);
    }

    #[test]
    fn test_rate_limiter_blocks_over_limit_per_category() {
        let limiter = RateLimiter::new(10);
        for _ in 0..10 {
            assert!(limiter.should_allow(LogCategory::Devices).0);
        }

        let (allowed, dropped) = limiter.should_allow(LogCategory::Devices);
        assert!(!allowed);
        assert_eq!(dropped, Some(1));

        // Other categories keep their own window
        assert!(limiter.should_allow(LogCategory::Bus).0);
    }

    #[test]
    fn test_rate_limiter_reports_drops_after_window() {
        let limiter = RateLimiter::new(3);
        for _ in 0..3 {
            limiter.should_allow(LogCategory::Timing);
        }
        // First drop is reported immediately, the rest accumulate
        limiter.should_allow(LogCategory::Timing);
        for _ in 0..4 {
            limiter.should_allow(LogCategory::Timing);
        }

        std::thread::sleep(Duration::from_millis(1100));

        let (allowed, dropped) = limiter.should_allow(LogCategory::Timing);
        assert!(allowed);
        assert_eq!(dropped, Some(4));
    }
}
