use std::io::{stderr, IsTerminal};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use scope_tmc::emulator::Emulator;
use scope_tmc::{
    scope, DeviceAddr, DeviceId, DeviceInfo, ScopeState, Session, SessionConfig, TagPolicy,
    UsbTransport,
};

#[derive(Parser)]
#[command(name = "scopectl")]
#[command(about = "Control the acquisition state of a USBTMC oscilloscope")]
struct Args {
    /// Talk to the built-in emulator instead of a USB device
    #[arg(long)]
    emulate: bool,

    /// USB vendor id (hex)
    #[arg(long, value_parser = parse_hex_u16, requires = "pid")]
    vid: Option<u16>,

    /// USB product id (hex)
    #[arg(long, value_parser = parse_hex_u16, requires = "vid")]
    pid: Option<u16>,

    /// USB bus number
    #[arg(long, requires = "address")]
    bus: Option<u8>,

    /// USB device address on the bus
    #[arg(long, requires = "bus")]
    address: Option<u8>,

    /// Timeout of each USB transfer in milliseconds
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Reject replies whose bTag differs from the request's
    #[arg(long)]
    strict_tags: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List USBTMC devices
    List,
    /// Print the *IDN? reply
    Identify,
    /// Print the profile the instrument is driven with
    Detect,
    /// Print the acquisition state
    State,
    /// Start continuous acquisition
    Run,
    /// Stop acquisition
    Stop,
    /// Arm a single acquisition
    Single,
    /// Stop if running, run otherwise
    Toggle,
    /// Blink the instrument's activity indicator
    Pulse,
    /// Print the USBTMC capabilities
    Caps,
    /// Send a query and print the reply
    Ask { query: String },
}

fn parse_hex_u16(s: &str) -> Result<u16, std::num::ParseIntError> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16)
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let format = tracing_subscriber::fmt::format()
        .with_target(false)
        .without_time();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(stderr().is_terminal())
        .with_writer(stderr)
        .event_format(format);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            Targets::new()
                .with_target("rusb", LevelFilter::OFF)
                .with_default(LevelFilter::from_level(level)),
        )
        .init();
}

fn detect<T: UsbTransport>(session: &Session<T>) -> Result<&'static scope::InstrumentProfile> {
    scope::detect(session).ok_or_else(|| anyhow!("no supported instrument detected"))
}

fn execute<T: UsbTransport>(session: &Session<T>, command: &Command) -> Result<()> {
    match command {
        Command::List => bail!("listing does not use a session"),
        Command::Identify => println!("{}", scope::identify(session)?),
        Command::Detect => println!("{}", detect(session)?.name),
        Command::State => {
            let profile = detect(session)?;
            println!("{}", scope::get_state(session, profile)?);
        }
        Command::Run | Command::Stop | Command::Single => {
            let state = match command {
                Command::Run => ScopeState::Running,
                Command::Single => ScopeState::Single,
                _ => ScopeState::Stopped,
            };
            scope::set_state(session, detect(session)?, state)?;
        }
        Command::Toggle => {
            let profile = detect(session)?;
            let next = match scope::get_state(session, profile)? {
                ScopeState::Stopped => ScopeState::Running,
                ScopeState::Running | ScopeState::Single => ScopeState::Stopped,
            };
            scope::set_state(session, profile, next)?;
            println!("{next}");
        }
        Command::Pulse => session.indicator_pulse()?,
        Command::Caps => println!("{:#?}", session.get_capabilities()?),
        Command::Ask { query } => {
            let mut answer = vec![0u8; scope_tmc::DEFAULT_BUFFER_SIZE * 16];
            let len = session.try_ask(query.as_bytes(), &mut answer, session.config().default_timeout)?;
            println!("{}", String::from_utf8_lossy(&answer[..len]).trim_end());
        }
    }
    Ok(())
}

fn drive<T: UsbTransport>(session: Session<T>, command: &Command) -> Result<()> {
    session.start()?;
    let result = execute(&session, command);
    session.stop();
    result
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Command::List = args.command {
        for device in scope_tmc::devices()? {
            println!("{device}");
        }
        return Ok(());
    }

    let tag_policy = if args.strict_tags {
        TagPolicy::MatchRequest
    } else {
        TagPolicy::ComplementOnly
    };
    let config = SessionConfig::default()
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_tag_policy(tag_policy);

    if args.emulate {
        return drive(Session::new(Emulator::new(), config), &args.command);
    }

    let session = match (args.vid, args.pid, args.bus, args.address) {
        (Some(vendor_id), Some(product_id), Some(bus), Some(device)) => Session::connect(
            DeviceInfo {
                id: DeviceId {
                    vendor_id,
                    product_id,
                },
                address: DeviceAddr { bus, device },
            },
            config,
        )?,
        (Some(vendor_id), Some(product_id), None, None) => Session::connect(
            DeviceId {
                vendor_id,
                product_id,
            },
            config,
        )?,
        (None, None, Some(bus), Some(device)) => {
            Session::connect(DeviceAddr { bus, device }, config)?
        }
        (None, None, None, None) => Session::connect((), config)?,
        _ => bail!("--vid/--pid and --bus/--address must be given in pairs"),
    };

    drive(session, &args.command)
}
