use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::auth::orchestrator::{Orchestrator, EXIT_FAILURE};
use crate::console::{Console, VirtualTerminal};
use crate::present::Presenter;
use crate::provider::{PlatformError, WebAccountManager};
use crate::trace::{self, TraceError, TraceGuard, TraceSink};
use crate::window::{self, Anchor};

use super::Options;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One full run: banner, trace file, anchor window and the token flow.
pub fn cmd_run(options: Options) -> Result<i32> {
    let console = Console::stdout();
    let _terminal = VirtualTerminal::enable();

    let exe = std::env::current_exe().context("Could not determine the gettoken binary path")?;
    let exe_stem = exe
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gettoken".to_string());

    console.verbose(&format!("{} (version {})\n", exe_stem, VERSION));

    let trace = TraceSink::new();
    let _trace_guard = TraceGuard::new(trace.clone());

    if options.trace {
        let dir = options
            .trace_path
            .clone()
            .or_else(|| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        match enable_trace(&trace, &dir, &exe_stem) {
            Ok(path) => console.verbose(&format!("Trace file: {}\n", path.display())),
            Err(e) => console.error(&format!(
                "Failed to create a trace file in {}: {}",
                dir.display(),
                e
            )),
        }
    }
    trace.write(format!(
        "{} (version {}), PID: {}",
        exe_stem,
        VERSION,
        std::process::id()
    ));

    if options.wait {
        wait_for_enter(&console)?;
    }

    let presenter = Presenter::new(console, trace, options.show_token);
    run_platform(options, presenter)
}

/// Opens `<dir>/<exe-stem>_<utc stamp>.csv`, creating `dir` if needed.
pub fn enable_trace(trace: &TraceSink, dir: &Path, exe_stem: &str) -> Result<PathBuf, TraceError> {
    fs::create_dir_all(dir)?;

    let path = dir.join(trace::trace_file_name(exe_stem, Utc::now()));
    trace.enable(&path)?;

    Ok(path)
}

fn wait_for_enter(console: &Console) -> Result<()> {
    console.line("Press Enter to continue ...");

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    Ok(())
}

#[cfg(windows)]
fn run_platform(options: Options, presenter: Presenter) -> Result<i32> {
    use crate::provider::wam::WamClient;
    use crate::window::win32::Win32Anchor;

    let mut anchor = Win32Anchor::create().context("Failed to create the anchor window")?;
    run_orchestration(&mut anchor, WamClient::new, options, presenter)
}

#[cfg(not(windows))]
fn run_platform(options: Options, presenter: Presenter) -> Result<i32> {
    use crate::provider::Unsupported;
    use crate::window::HeadlessAnchor;

    let mut anchor = HeadlessAnchor::new();
    run_orchestration(&mut anchor, || Ok(Unsupported), options, presenter)
}

/// Runs the token flow behind `anchor`'s message loop.
///
/// `connect` runs on the orchestration thread, so platform state that is
/// bound to a thread is created where it is used.
pub fn run_orchestration<A, M, F>(
    anchor: &mut A,
    connect: F,
    options: Options,
    presenter: Presenter,
) -> Result<i32>
where
    A: Anchor,
    M: WebAccountManager,
    F: FnOnce() -> Result<M, PlatformError> + Send + 'static,
{
    window::run_until_complete(anchor, move |window| {
        let manager = match connect() {
            Ok(manager) => manager,
            Err(e) => {
                presenter.error(&format!("Failed to initialize the Windows Runtime. {}", e));
                return EXIT_FAILURE;
            }
        };

        Orchestrator::new(&manager, &options, &presenter).run(window)
    })
    .context("The anchor window message loop failed")
}
