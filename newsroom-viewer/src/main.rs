//! Newsroom viewer
//!
//! Headless front end for the live broadcast. Owns one
//! [`BroadcastController`], ticks it on a UI timer, and prints the status
//! whenever it changes.
//!
//! Commands on stdin:
//!
//! | input          | action                      |
//! |----------------|-----------------------------|
//! | `r`, `reconnect` | manual reconnect          |
//! | `s`, `status`  | request a status update     |
//! | `b [anchor]`   | trigger a breakdown         |
//! | `q <quality>`  | change stream quality       |
//! | `quit`         | exit (Ctrl-C works too)     |

mod player;
mod sink;

use anyhow::Context;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{error, info, warn};
use newsroom_bridge::{BroadcastConfig, BroadcastController, StatusView};
use player::ConsoleClipPlayer;
use sink::MeteringSink;
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// UI timer period
const TICK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
enum ViewerCommand {
    Reconnect,
    RequestStatus,
    TriggerBreakdown(Option<String>),
    ChangeQuality(String),
    Quit,
}

impl ViewerCommand {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?;
        let argument = words.next().map(str::to_string);
        match command {
            "r" | "reconnect" => Some(ViewerCommand::Reconnect),
            "s" | "status" => Some(ViewerCommand::RequestStatus),
            "b" | "breakdown" => Some(ViewerCommand::TriggerBreakdown(argument)),
            "q" | "quality" => argument.map(ViewerCommand::ChangeQuality),
            "quit" | "exit" => Some(ViewerCommand::Quit),
            _ => None,
        }
    }
}

fn spawn_stdin_reader(commands: Sender<ViewerCommand>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match ViewerCommand::parse(&line) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command: {}", line.trim()),
            }
        }
    });
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .write_style(env_logger::WriteStyle::Auto)
        .target(env_logger::Target::Stdout)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BroadcastConfig::load().context("failed to load newsroom configuration")?;
    init_logging(&config.log_level);
    info!("Newsroom viewer starting, backend {}", config.ws_url);

    let (sink, meter) = MeteringSink::new();
    let controller = BroadcastController::with_backend(
        config,
        Box::new(sink),
        Arc::new(ConsoleClipPlayer),
    )
    .context("failed to build broadcast client")?;
    controller.start().context("failed to start broadcast client")?;

    let (command_tx, command_rx) = unbounded();
    let ctrlc_tx = command_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(ViewerCommand::Quit);
    })
    .context("failed to install Ctrl-C handler")?;
    spawn_stdin_reader(command_tx);

    run_ui_loop(&controller, &command_rx, &meter).await;

    controller.shutdown().await;
    info!("Newsroom viewer stopped");
    Ok(())
}

async fn run_ui_loop(
    controller: &BroadcastController,
    commands: &Receiver<ViewerCommand>,
    meter: &sink::Meter,
) {
    let mut timer = interval(TICK);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        timer.tick().await;

        for command in commands.try_iter() {
            if !handle_command(controller, command) {
                return;
            }
        }

        let summary = controller.tick(Instant::now());
        for alert in &summary.dismissed_alerts {
            info!("Alert for {} cleared", alert.anchor);
        }

        let state = controller.state();
        for entry in state.timeline.drain() {
            println!("[{}] {}", entry.timestamp.format("%H:%M:%S"), entry.message);
        }
        if let Some(status) = state.status.read_if_dirty() {
            println!("{}", StatusView::project(&status));
            println!("  {}", meter.summary());
        }
    }
}

/// Returns `false` when the viewer should exit
fn handle_command(controller: &BroadcastController, command: ViewerCommand) -> bool {
    match command {
        ViewerCommand::Quit => {
            info!("Exit requested");
            return false;
        }
        ViewerCommand::Reconnect => {
            if let Err(e) = controller.reconnect() {
                error!("Reconnect failed: {}", e);
            }
        }
        ViewerCommand::RequestStatus => {
            if !controller.request_status() {
                warn!("Not connected, status request dropped");
            }
        }
        ViewerCommand::TriggerBreakdown(anchor) => {
            if !controller.trigger_breakdown(anchor, None) {
                warn!("Not connected, breakdown request dropped");
            }
        }
        ViewerCommand::ChangeQuality(quality) => {
            if !controller.change_quality(quality) {
                warn!("Not connected, quality change dropped");
            }
        }
    }
    true
}
