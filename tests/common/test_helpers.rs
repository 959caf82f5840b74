#![allow(dead_code)]
use autopiloot_limiter::{
    FixedCalendar, LimitOverrides, LimitsConfig, ManualClock, PluginLimiters, TrackingSleeper,
};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

/// Registry on manual time: sleeping advances `clock`, the calendar starts at
/// 2025-01-01 00:00.
pub struct ManualTime {
    pub limiters: Arc<PluginLimiters>,
    pub clock: ManualClock,
    pub sleeper: TrackingSleeper,
    pub calendar: FixedCalendar,
}

pub fn limits(monthly: u64, per_minute: u32, burst: u32) -> LimitOverrides {
    LimitOverrides { monthly: Some(monthly), per_minute: Some(per_minute), burst: Some(burst) }
}

pub fn manual_registry(config: &LimitsConfig) -> ManualTime {
    let clock = ManualClock::new();
    let sleeper = TrackingSleeper::advancing(clock.clone());
    let calendar = FixedCalendar::at_month_start(2025, 1).expect("valid month");
    let limiters = PluginLimiters::builder(config)
        .clock(clock.clone())
        .sleeper(sleeper.clone())
        .calendar(calendar.clone())
        .build()
        .expect("valid limits");
    ManualTime { limiters: Arc::new(limiters), clock, sleeper, calendar }
}

pub fn single_plugin(name: &str, monthly: u64, per_minute: u32, burst: u32) -> ManualTime {
    let config = LimitsConfig::default().with_plugin(name, limits(monthly, per_minute, burst));
    manual_registry(&config)
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's `tracing` output here until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(self.clone()))
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;
    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(self.0.clone())
    }
}

pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
