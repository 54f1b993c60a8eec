pub mod application;
pub mod console;
pub mod domain;
pub mod infrastructure;

use application::bootstrap::{BootstrapResult, bootstrap_workspace};
use application::calendar_sync::SyncStatus;
use application::reconciler::TimerSnapshot;
use application::runtime::{Command, StageTimer};
use chrono::Utc;
use chrono_tz::Tz;
use console::{ConsoleInput, HELP, describe, describe_schedule, parse_line};
use domain::models::Act;
use infrastructure::calendar_bridge::{JsonFileCalendarBridge, watch_file_changes};
use infrastructure::command_log::CommandLog;
use infrastructure::error::InfraError;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub fn run() -> Result<(), InfraError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let workspace_root = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let workspace = bootstrap_workspace(&workspace_root)?;
    log::info!(
        "workspace {} ready, calendar feed {}",
        workspace.workspace_root.display(),
        workspace.config.events_file.display()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(workspace));
    Ok(())
}

async fn serve(workspace: BootstrapResult) {
    let config = workspace.config;
    let bridge = Arc::new(JsonFileCalendarBridge::new(&config.events_file));
    let journal = CommandLog::in_dir(&workspace.logs_dir);
    let timer = StageTimer::new(bridge, &config, journal);

    let snapshots = timer.subscribe();
    let schedule = timer.subscribe_schedule();
    let status = timer.subscribe_status();
    let (commands, receiver) = mpsc::unbounded_channel();

    let watcher = {
        let commands = commands.clone();
        watch_file_changes(config.events_file.clone(), config.tick_interval, move || {
            commands.send(Command::CalendarChanged).is_ok()
        })
    };
    let printer = tokio::spawn(print_snapshots(snapshots, status.clone(), config.time_zone));
    spawn_console(commands, schedule, status, config.time_zone);

    println!("{HELP}");
    timer.run(receiver).await;

    watcher.abort();
    printer.abort();
}

async fn print_snapshots(
    mut snapshots: watch::Receiver<TimerSnapshot>,
    status: watch::Receiver<SyncStatus>,
    time_zone: Tz,
) {
    let mut last_line = String::new();
    while snapshots.changed().await.is_ok() {
        let line = describe(&snapshots.borrow_and_update(), *status.borrow(), time_zone);
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
    }
}

fn spawn_console(
    commands: mpsc::UnboundedSender<Command>,
    schedule: watch::Receiver<Vec<Act>>,
    status: watch::Receiver<SyncStatus>,
    time_zone: Tz,
) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        forward_console(stdin.lock(), &commands, &schedule, &status, time_zone);
    });
}

/// Feeds typed lines to the runtime until `quit` or end of input. End of
/// input also shuts the runtime down.
fn forward_console<R: BufRead>(
    input: R,
    commands: &mpsc::UnboundedSender<Command>,
    schedule: &watch::Receiver<Vec<Act>>,
    status: &watch::Receiver<SyncStatus>,
    time_zone: Tz,
) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        let acts = schedule.borrow().clone();
        match parse_line(&line, &acts, time_zone, Utc::now()) {
            Ok(None) => {}
            Ok(Some(ConsoleInput::Help)) => println!("{HELP}"),
            Ok(Some(ConsoleInput::List)) => {
                println!("{}", describe_schedule(&acts, time_zone));
                println!("sync: {}", status.borrow().as_str());
            }
            Ok(Some(ConsoleInput::Command(command))) => {
                let shutdown = command == Command::Shutdown;
                if commands.send(command).is_err() || shutdown {
                    return;
                }
            }
            Err(message) => eprintln!("{message}"),
        }
    }
    log::info!("console input closed");
    let _ = commands.send(Command::Shutdown);
}
