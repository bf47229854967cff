//! installflow entrypoint: runs the install and shows its progress.

mod events;
mod handoff;
mod host;
mod runtime_config;
mod screen;
mod terminal;
mod ui;

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use installflow_core::bridge::{loop_channel, Bridge, LoopReceiver, WorkerPool};
use installflow_core::installer::InstallerPlan;
use installflow_core::orchestrator::{PROGRESS_EXCERPT, PROGRESS_TITLE};
use installflow_core::{
    util, Config, EngineError, InstallHost, InstallerRun, Orchestrator, ProgressDisplay,
};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::events::Wake;
use crate::handoff::{start_handoff_watcher, HandoffTargets};
use crate::host::{HostIo, SystemHost};
use crate::runtime_config::{init_tracing, load_config};
use crate::screen::Screen;
use crate::terminal::TerminalGuard;

/// The orchestrator as wired to the real host and the terminal display.
pub type Controller = Orchestrator<SystemHost, Screen>;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay canned installer events instead of installing; exit instead of rebooting
    #[arg(long)]
    dry_run: bool,

    /// Treat the postinstall configuration as already supplied
    #[arg(long)]
    postinstall_ready: bool,

    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args).context("load config")?;

    if args.check {
        println!("configuration loaded successfully");
        return Ok(());
    }

    init_tracing(&config)?;
    info!(
        simulate = config.general.simulate,
        workers = config.general.workers,
        "starting installflow"
    );
    if util::diagnostic_mode() {
        info!(
            limit = util::log_limit(),
            "diagnostic logging enabled (snippets capped; newlines stripped)"
        );
    }

    let (loop_tx, mut callbacks) = loop_channel::<Controller>();
    let pool = WorkerPool::new(config.general.workers).context("start worker pool")?;
    let host = SystemHost::new(Bridge::new(pool, loop_tx.clone()), &config);
    let plan = InstallerPlan::from_config(&config);
    let mut controller = Orchestrator::new(host, Screen::new(), plan);
    controller
        .display_mut()
        .set_header(PROGRESS_TITLE, PROGRESS_EXCERPT);

    start_handoff_watcher(
        HandoffTargets {
            postinstall_config: controller
                .plan()
                .config_files(InstallerRun::Postinstall)[0]
                .to_path_buf(),
            network_source: config.handoff.network_config.clone(),
        },
        loop_tx,
    );
    apply_existing_handoffs(&mut controller, &config, args.postinstall_ready)?;

    let mut terminal_guard = TerminalGuard::new().context("set up terminal")?;
    let result = run_loop(&mut terminal_guard, &mut controller, &mut callbacks).await;
    controller.host_mut().shutdown().await;
    terminal_guard.restore()?;

    match &result {
        Ok(()) => info!(phase = %controller.phase(), "installflow exiting"),
        Err(err) => error!(phase = %controller.phase(), ?err, "installflow stopped"),
    }
    result
}

/// Pick up configuration that was handed off before the watcher was registered.
fn apply_existing_handoffs(
    controller: &mut Controller,
    config: &Config,
    postinstall_ready: bool,
) -> Result<()> {
    let postinstall = controller.plan().config_files(InstallerRun::Postinstall)[0].to_path_buf();
    if postinstall_ready || postinstall.exists() {
        controller
            .postinstall_config_written()
            .context("mark postinstall config ready")?;
    }
    if let Some(source) = config.handoff.network_config.as_ref() {
        if source.exists() {
            controller
                .network_config_written(source)
                .context("copy network config")?;
        }
    }
    Ok(())
}

async fn run_loop(
    terminal_guard: &mut TerminalGuard,
    controller: &mut Controller,
    callbacks: &mut LoopReceiver<Controller>,
) -> Result<()> {
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Event>();
    spawn_input_thread(input_tx);
    let mut input_open = true;
    let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut hangup = signal(SignalKind::hangup()).context("install SIGHUP handler")?;

    controller.begin_install().context("begin install")?;

    loop {
        terminal_guard
            .terminal_mut()
            .draw(|frame| ui::draw(frame, controller.display()))?;
        if controller.host().exit_requested() {
            return Ok(());
        }

        let wake = tokio::select! {
            callback = callbacks.next() => match callback {
                Some(callback) => Wake::Callback(callback),
                None => Wake::Terminate,
            },
            input = input_rx.recv(), if input_open => match input {
                Some(event) => Wake::Input(event),
                None => Wake::InputClosed,
            },
            io = controller.host_mut().next_io() => Wake::Io(io),
            _ = terminate.recv() => Wake::Terminate,
            _ = hangup.recv() => Wake::Terminate,
        };

        match wake {
            Wake::Callback(callback) => callback(controller)?,
            Wake::Input(event) => handle_event(controller, event)?,
            Wake::InputClosed => {
                warn!("terminal input closed");
                input_open = false;
            }
            Wake::Io(io) => apply_io(controller, io),
            Wake::Terminate => {
                info!("termination requested");
                return Ok(());
            }
        }
    }
}

fn apply_io(controller: &mut Controller, io: HostIo) {
    match io {
        HostIo::SpinnerTick => controller.spinner_tick(),
        HostIo::LogTail(text) => controller.log_tail(&text),
        HostIo::Record(record) => controller.event_record(&record),
        HostIo::TailClosed | HostIo::FeedClosed => {}
    }
}

fn handle_event(controller: &mut Controller, event: Event) -> Result<(), EngineError> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(controller, key),
        _ => Ok(()),
    }
}

fn handle_key(controller: &mut Controller, key: KeyEvent) -> Result<(), EngineError> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        info!("interrupted from keyboard");
        controller.host_mut().request_exit();
        return Ok(());
    }

    let completion = controller.display().completion;
    let log_view = controller.display().log_view;
    match key.code {
        KeyCode::Enter if !controller.progress_view_active() => controller.show_progress(),
        KeyCode::Char('l') | KeyCode::Char('L') if log_view => {
            controller.close_full_log();
            Ok(())
        }
        KeyCode::Char('l') | KeyCode::Char('L') => controller.show_full_log(),
        KeyCode::Esc if log_view => {
            controller.close_full_log();
            Ok(())
        }
        KeyCode::Char('r') | KeyCode::Char('R')
            if completion.is_some_and(|actions| actions.reboot) =>
        {
            controller.reboot()
        }
        KeyCode::Char('q') | KeyCode::Char('Q')
            if completion.is_some_and(|actions| actions.exit_to_shell) =>
        {
            controller.quit()
        }
        _ => Ok(()),
    }
}

fn spawn_input_thread(input_tx: mpsc::UnboundedSender<Event>) {
    // Forward blocking terminal reads to the loop; exit once the loop is gone.
    let spawned = thread::Builder::new()
        .name("installflow-input".to_string())
        .spawn(move || {
            while let Ok(event) = event::read() {
                if input_tx.send(event).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        warn!(?err, "failed to spawn terminal input thread");
    }
}
