#[macro_use]
extern crate log;

use std::env;
use std::path::Path;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use getopts::Options;
use log::LevelFilter;
use signal_hook::consts::{SIGINT, SIGTERM};

use seek_control::config::Config;
use seek_control::control::{ControlContext, ControlLoop, RunSummary};
use seek_control::error::{Error, Result};
use seek_control::frame_source::ImageSequence;
use seek_control::logger;
use seek_control::transport::{LogTransport, MqttTransport};
use seek_control::vision::ContourDetector;

const PROGRAM: &str = "seek-control";


struct CliOptions {
    config_path: Option<String>,
    broker: Option<String>,
    frames: Option<String>,
    log_dir: Option<String>,
    dry_run: bool,
    verbose: bool,
}


fn main() {
    let options = match handle_opts() {
        Some(options) => options,
        None => return,
    };
    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    if let Err(e) = init_logging(&options, &config) {
        eprintln!("{}", e);
        process::exit(1);
    }

    info!("Starting up");
    match run(&options, &config) {
        Ok(summary) => info!(
            "Station shutting down, final state {}, {} commands sent",
            summary.final_state,
            summary.sent),
        Err(e) => {
            error!("Station giving up: {}", e);
            process::exit(1);
        }
    }
}


fn load_config(options: &CliOptions) -> Result<Config> {
    let mut config = match options.config_path {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(ref broker) = options.broker {
        config.mqtt.broker = broker.clone();
    }
    if let Some(ref frames) = options.frames {
        config.control.frames_dir = Some(frames.clone());
    }
    if let Some(ref log_dir) = options.log_dir {
        config.logging.log_dir = Some(log_dir.clone());
    }
    Ok(config)
}


fn init_logging(options: &CliOptions, config: &Config) -> Result<()> {
    let level = if options.verbose {
        LevelFilter::Debug
    } else {
        config.logging.level_filter()?
    };
    logger::init(PROGRAM, level, config.logging.log_dir.as_ref().map(Path::new))
}


fn run(options: &CliOptions, config: &Config) -> Result<RunSummary> {
    let quit = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&quit))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&quit))?;

    let frames_dir = match config.control.frames_dir {
        Some(ref frames_dir) => frames_dir.clone(),
        None => return Err(Error::InvalidConfig("No frames directory, use --frames".to_string())),
    };
    let source = ImageSequence::open(&frames_dir, Duration::from_millis(config.control.frame_interval_ms))?;
    if source.is_empty() {
        return Err(Error::InvalidConfig(format!("No frames found in {}", frames_dir)));
    }
    let context = ControlContext::from_config(config)?;

    if options.dry_run {
        info!("Dry run, commands will only be logged");
        let mut control = ControlLoop::new(context, source, ContourDetector, LogTransport::new(), config);
        control.run(&quit)
    } else {
        let transport = MqttTransport::connect(&config.mqtt)?;
        let mut control = ControlLoop::new(context, source, ContourDetector, transport, config);
        control.run(&quit)
    }
}


fn handle_opts() -> Option<CliOptions> {
    let mut opts = Options::new();
    opts.optopt("c", "config", "Path to the TOML config file.", "FILE");
    opts.optopt("b", "broker", "MQTT broker URI, e.g. tcp://192.168.1.101:1883.", "URI");
    opts.optopt("f", "frames", "Directory of camera frames to play back.", "DIR");
    opts.optopt("l", "log-dir", "Also write logs to a file in this directory.", "DIR");
    opts.optflag("n", "dry-run", "Log commands instead of publishing them.");
    opts.optflag("v", "verbose", "Prints extra logging.");
    opts.optflag("h", "help", "Print this help menu.");
    let mut args = env::args();
    args.next();  // Skip the program name
    let matches = match opts.parse(args) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Unable to parse options: {}", e);
            print_usage(&opts);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        print_usage(&opts);
        return None;
    }

    Some(CliOptions {
        config_path: matches.opt_str("c"),
        broker: matches.opt_str("b"),
        frames: matches.opt_str("f"),
        log_dir: matches.opt_str("l"),
        dry_run: matches.opt_present("n"),
        verbose: matches.opt_present("v"),
    })
}


fn print_usage(opts: &Options) {
    let brief = format!("Usage: {} [options]", PROGRAM);
    print!("{}", opts.usage(&brief));
}
