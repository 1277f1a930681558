use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct SerialLogger {
    max_level: LevelFilter,
}

impl SerialLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Installs the logger. Call once, after the UART has been initialized.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        // No allocator this early; park the logger in a static instead.
        static mut LOGGER: Option<SerialLogger> = None;

        let max_level = self.max_level;

        // SAFETY: Bring-up is single threaded with interrupts masked, and the
        // static is only written here.
        let logger: &'static SerialLogger = unsafe { (*(&raw mut LOGGER)).insert(self) };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    #[cfg(target_arch = "x86_64")]
    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        crate::serial_trace!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn log(&self, _record: &Record) {}

    fn flush(&self) {
        // Polled UART, nothing buffered.
    }
}
