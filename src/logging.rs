//! Structured log lines for the social store.
//!
//! Every line written through [`tlog!`] has the shape:
//!
//! ```text
//! 20261016T09:12:44.031 - src/follow.rs:88 - follow: alice -> bob
//! ```
//!
//! Output goes to stderr unless [`set_writer`] installs another sink (a
//! file, a test buffer). Identities and thread keys are tinted with a
//! stable colour derived from their text when stderr is a terminal, so the
//! same participant reads the same across interleaved processes.

use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_WRITER: LazyLock<Mutex<Box<dyn Write + Send>>> =
    LazyLock::new(|| Mutex::new(Box::new(io::stderr())));

/// Detect colour support on stderr. Call once from `main`.
pub fn init() {
    COLOUR_ENABLED.store(io::stderr().is_terminal(), Ordering::Relaxed);
}

/// Route all further [`tlog!`] output to `w`. Colour is switched off.
pub fn set_writer(w: Box<dyn Write + Send>) {
    COLOUR_ENABLED.store(false, Ordering::Relaxed);
    let mut guard = LOG_WRITER.lock().unwrap_or_else(|e| e.into_inner());
    *guard = w;
}

pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

const PALETTE: &[&str] = &[
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m", "\x1b[32m",
    "\x1b[33m", "\x1b[34m", "\x1b[35m", "\x1b[36m",
];

fn tint(text: &str) -> &'static str {
    let hash = text
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    PALETTE[(hash as usize) % PALETTE.len()]
}

/// Render an identity handle for a log line.
pub fn identity(id: &str) -> String {
    if colour_enabled() {
        format!("{}{id}{RESET}", tint(id))
    } else {
        id.to_string()
    }
}

/// Render a canonical thread key; the unit separator is shown as `<->`.
pub fn thread(key: &str) -> String {
    let readable = key.replace('\u{1f}', "<->");
    if colour_enabled() {
        format!("{}{readable}{RESET}", tint(key))
    } else {
        readable
    }
}

/// Wall-clock time as `YYYYMMDDTHH:MM:SS.mmm` (UTC).
pub fn format_timestamp() -> String {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = elapsed.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let of_day = secs % 86_400;
    format!(
        "{year:04}{month:02}{day:02}T{:02}:{:02}:{:02}.{:03}",
        of_day / 3600,
        (of_day % 3600) / 60,
        of_day % 60,
        elapsed.subsec_millis()
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Backing function for [`tlog!`].
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    let formatted = if colour_enabled() {
        format!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}")
    } else {
        format!("{ts} - {file}:{line} - {msg}")
    };
    let mut writer = LOG_WRITER.lock().unwrap_or_else(|e| e.into_inner());
    let _ = writeln!(*writer, "{formatted}");
}

/// Write one timestamped log line tagged with the call site.
///
/// ```ignore
/// tlog!("follow: {} -> {}", logging::identity(a), logging::identity(b));
/// ```
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
