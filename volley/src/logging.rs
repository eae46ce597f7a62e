use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _};

/// Keeps the non-blocking writer alive for the duration of the run; dropping
/// it flushes the log file.
pub struct LogRedirect {
    pub path: Option<PathBuf>,
    _guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber for this run. Verbose runs log to the
/// console; otherwise logs are redirected to a per-run file whose path is
/// reported back so it can be recorded on the result.
pub fn init(scenario: &str, log_dir: Option<&Path>, verbose: bool) -> anyhow::Result<LogRedirect> {
    if verbose {
        // Ignore the error when a subscriber is already installed (tests,
        // repeated execute calls).
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(env_filter()))
            .try_init();
        return Ok(LogRedirect {
            path: None,
            _guard: None,
        });
    }

    let dir = log_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let file_name = format!("volley-{scenario}-{timestamp}.log");
    let path = dir.join(&file_name);

    let appender = tracing_appender::rolling::never(&dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter()),
        )
        .try_init();

    Ok(LogRedirect {
        path: Some(path),
        _guard: Some(guard),
    })
}

/// Replays a run's log file to stdout; used by `--verbose-fail` after a
/// failed run.
pub fn replay(path: &Path) -> anyhow::Result<()> {
    let mut contents = String::new();
    std::fs::File::open(path)
        .with_context(|| format!("opening log file {}", path.display()))?
        .read_to_string(&mut contents)
        .with_context(|| format!("reading log file {}", path.display()))?;
    print!("{contents}");
    Ok(())
}
