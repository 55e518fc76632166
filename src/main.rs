use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::info;

use schizoid::paths::AppPaths;
use schizoid::trigger::{LogSink, PortSink, TriggerDispatcher, START_LISTENING, STOP_LISTENING};
use schizoid::{TaskConfig, TriggerConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" || args[1] == "help" {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "trigger-test" => run_trigger_test(&args[2..]),
        "config" => print_config(args.get(2).map(PathBuf::from)),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("schizoid (experiment screen runtime)");
    println!("usage:");
    println!("  schizoid trigger-test [--port DEVICE] [--address N] [--delay-ms N] [--interval-ms N]");
    println!("  schizoid config [PATH]");
    println!("  schizoid --help");
    println!();
    println!("trigger-test sends the start code, codes 1 to 10 and the stop code.");
    println!("Without --port the codes are only logged.");
}

fn parse_number(flag: &str, value: Option<&String>) -> Result<u64, Box<dyn std::error::Error>> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    Ok(parsed.map_err(|e| format!("{} {:?}: {}", flag, value, e))?)
}

fn run_trigger_test(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = TriggerConfig::default();
    let mut interval = Duration::from_secs(2);

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--port" => {
                cfg.port = Some(PathBuf::from(value.ok_or("--port needs a value")?));
            }
            "--address" => cfg.address = parse_number("--address", value)?,
            "--delay-ms" => cfg.code_delay_ms = parse_number("--delay-ms", value)?,
            "--interval-ms" => interval = Duration::from_millis(parse_number("--interval-ms", value)?),
            other => return Err(format!("unknown option {}", other).into()),
        }
        i += 2;
    }

    let mut dispatcher = match &cfg.port {
        Some(device) => TriggerDispatcher::spawn(PortSink::open(device, cfg.address)?, cfg.code_delay())?,
        None => TriggerDispatcher::spawn(LogSink, cfg.code_delay())?,
    };

    info!("Sending {}", START_LISTENING);
    dispatcher.send(START_LISTENING)?;
    for code in 1..=10 {
        info!("Sending {}", code);
        dispatcher.send(code)?;
        thread::sleep(interval);
    }
    info!("Sending {}", STOP_LISTENING);
    dispatcher.send(STOP_LISTENING)?;
    dispatcher.shutdown()?;

    println!("Done");
    Ok(())
}

fn print_config(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => Some(p),
        None => {
            let default = AppPaths::new()?.config_file();
            default.exists().then_some(default)
        }
    };

    let cfg = match &path {
        Some(p) => {
            info!("Loading {}", p.display());
            TaskConfig::load(p)?
        }
        None => TaskConfig::default(),
    };
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
