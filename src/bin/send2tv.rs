use std::{
    fs::File,
    io::{self, BufRead},
    process::ExitCode,
    thread,
};

use crossbeam_channel::{Sender, unbounded};
use log::{LevelFilter, debug, info};
use send2tv_rs::{
    enums::messages::UserCommand,
    globals::statics::{APP_NAME, APP_VERSION},
    session::{
        controller::PlaybackTarget,
        runner::{discover_renderers, run_session},
    },
    utils::{
        cancel::CancelToken,
        commandline::Args,
        configuration::Configuration,
        local_ip_address::get_interfaces,
        ui_logger::{LogCategory, UI_TARGET, ui_log},
    },
};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

fn main() -> ExitCode {
    // collect command line arguments
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            Args::usage();
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        Args::usage();
        return ExitCode::SUCCESS;
    }

    // initialize config, the command line wins for this run only
    let loaded = Configuration::read_config(args.config_id.as_deref());
    let mut config = loaded.clone();
    args.apply_to(&mut config);
    if cfg!(debug_assertions) && config.log_level < LevelFilter::Debug {
        config.log_level = LevelFilter::Debug;
    }
    init_logging(&config);

    info!(
        "{} V {} - Running on {}, {}, {} - Logging started.",
        APP_NAME,
        APP_VERSION,
        std::env::consts::ARCH,
        std::env::consts::FAMILY,
        std::env::consts::OS
    );
    if let Some(config_id) = &config.config_id {
        info!("Loaded configuration -c {config_id}");
    }
    debug!("Current config: {config:?}");
    for ip in get_interfaces() {
        debug!("Found network: {ip}");
    }

    if args.discover {
        return run_discovery(&config);
    }

    let renderer = config.last_renderer.clone();
    if renderer.is_empty() {
        ui_log(
            LogCategory::Error,
            "No TV given: use -t <address>, or -d to find one",
        );
        return ExitCode::FAILURE;
    }
    let target = if args.screen {
        PlaybackTarget::Screen
    } else if args.files.is_empty() {
        Args::usage();
        return ExitCode::FAILURE;
    } else {
        PlaybackTarget::Files(args.files.clone())
    };

    // Ctrl-C stops the session at its next tick
    let cancel = CancelToken::new();
    let cancel_c = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Received Ctrl+C -> stopping.");
        cancel_c.cancel();
    }) {
        debug!("no Ctrl-C handler: {e}");
    }

    // interactive commands come from stdin on their own thread
    let (cmd_tx, cmd_rx) = unbounded();
    let step = config.seek_step_secs;
    if let Err(e) = thread::Builder::new()
        .name("stdin_commands".into())
        .spawn(move || read_commands(&cmd_tx, step))
    {
        debug!("no interactive commands: {e}");
    }
    ui_log(
        LogCategory::Info,
        "Commands: q = quit, n = next, f/b = seek forward/back, +N/-N = seek N seconds",
    );

    match run_session(&config, &renderer, target, cmd_rx, cancel) {
        Ok(()) => {
            if let Err(e) = loaded.with_last_renderer(&renderer).update_config() {
                debug!("could not save the configuration: {e}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            ui_log(LogCategory::Error, &format!("Error: {e}"));
            ExitCode::FAILURE
        }
    }
}

/// terminal logger on stderr plus a log file in the config directory
fn init_logging(config: &Configuration) {
    let loglevel = config.log_level;
    // ui lines were already printed by ui_log
    let term_config = ConfigBuilder::new()
        .add_filter_ignore_str(UI_TARGET)
        .build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        loglevel,
        term_config,
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    let logfile = config.log_file();
    match File::create(&logfile) {
        Ok(file) => loggers.push(WriteLogger::new(
            loglevel,
            simplelog::Config::default(),
            file,
        )),
        Err(e) => eprintln!("No log file {}: {e}", logfile.display()),
    }
    let _ = CombinedLogger::init(loggers);
}

fn run_discovery(config: &Configuration) -> ExitCode {
    ui_log(LogCategory::Info, "Searching for DLNA renderers...");
    match discover_renderers(config) {
        Ok(renderers) => {
            for r in &renderers {
                ui_log(
                    LogCategory::Info,
                    &format!(
                        "{} - {} [{}] at {}",
                        r.remote_addr, r.friendly_name, r.model_name, r.location
                    ),
                );
            }
            if renderers.is_empty() {
                ui_log(LogCategory::Info, "No devices found.");
            } else {
                ui_log(
                    LogCategory::Info,
                    &format!("Found {} device(s).", renderers.len()),
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            ui_log(LogCategory::Error, &format!("Discovery failed: {e}"));
            ExitCode::FAILURE
        }
    }
}

/// forward stdin lines as commands until quit or end of input
fn read_commands(tx: &Sender<UserCommand>, step: u32) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        match UserCommand::parse_line(&line, step) {
            Some(command) => {
                if tx.send(command).is_err() || command == UserCommand::Quit {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => println!("Unknown command '{}'", line.trim()),
        }
    }
}
