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

use seek_control::actuator::Actuator;
use seek_control::config::Config;
use seek_control::driver::{LogDriver, MotorDriver};
use seek_control::engine::Engine;
use seek_control::error::Result;
use seek_control::logger;
use seek_control::pi_blaster_driver::PiBlasterDriver;
use seek_control::transport::MqttCommandReceiver;

const PROGRAM: &str = "seek-actuator";


struct CliOptions {
    config_path: Option<String>,
    broker: Option<String>,
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
    let level = if options.verbose {
        Ok(LevelFilter::Debug)
    } else {
        config.logging.level_filter()
    };
    let logging = level.and_then(|level| {
        logger::init(PROGRAM, level, config.logging.log_dir.as_ref().map(Path::new))
    });
    if let Err(e) = logging {
        eprintln!("{}", e);
        process::exit(1);
    }

    info!("Starting up");
    let result = if options.dry_run {
        info!("Dry run, wheels will only be logged");
        run(LogDriver::new(), &config)
    } else {
        match PiBlasterDriver::open(&config.actuator.device, config.actuator.pins.clone()) {
            Ok(driver) => run(driver, &config),
            Err(e) => Err(e),
        }
    };
    match result {
        Ok(_) => info!("Actuator shutting down"),
        Err(e) => {
            error!("Actuator giving up: {}", e);
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
    if let Some(ref log_dir) = options.log_dir {
        config.logging.log_dir = Some(log_dir.clone());
    }
    Ok(config)
}


fn run<D: MotorDriver>(driver: D, config: &Config) -> Result<()> {
    let quit = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&quit))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&quit))?;

    let engine = Engine::new(driver, Duration::from_millis(config.actuator.action_duration_ms));
    let receiver = MqttCommandReceiver::connect(&config.mqtt)?;
    let mut actuator = Actuator::new(engine, receiver, config);
    actuator.run(&quit)
}


fn handle_opts() -> Option<CliOptions> {
    let mut opts = Options::new();
    opts.optopt("c", "config", "Path to the TOML config file.", "FILE");
    opts.optopt("b", "broker", "MQTT broker URI, e.g. tcp://192.168.1.101:1883.", "URI");
    opts.optopt("l", "log-dir", "Also write logs to a file in this directory.", "DIR");
    opts.optflag("n", "dry-run", "Log wheel changes instead of driving the motors.");
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
        log_dir: matches.opt_str("l"),
        dry_run: matches.opt_present("n"),
        verbose: matches.opt_present("v"),
    })
}


fn print_usage(opts: &Options) {
    let brief = format!("Usage: {} [options]", PROGRAM);
    print!("{}", opts.usage(&brief));
}
