use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{WrapErr, bail, eyre},
};
use facet_pretty::FacetPretty;
use rocstar_board::{
    bringup::{self, Bringup, BringupOptions},
    checks,
    drs4::{
        CalibrationMode, CommandTrigger, DigitizerConfig, ReadoutLimits, Sequencer, TriggerSource,
    },
    info::BoardInfo,
    sim::SimulatedBoard,
};
use rocstar_io::{
    Bus, DEFAULT_TIMEOUT, Hex, Reg, Session, Space, SshSession, Transport, tcp::TcpTransport,
};
use tracing::info;

use crate::cli_helpers::{BoardAddr, parse_hex};

mod cli_helpers;

const DEFAULT_PORT: u16 = 5000;

#[derive(clap::Parser)]
struct Args {
    #[command(flatten)]
    global: GlobalOpts,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Args)]
struct GlobalOpts {
    /// Board number (192.168.1.N) or address
    #[arg(long, default_value = "45", global = true)]
    board: BoardAddr,

    /// Bus server port
    #[arg(long, default_value_t = DEFAULT_PORT, global = true)]
    port: u16,

    #[arg(long, default_value = "tcp", global = true)]
    backend: Backend,

    /// Per-transaction bus timeout
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64, global = true)]
    timeout_ms: u64,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress_bar: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum Backend {
    #[default]
    Tcp,
    /// In-memory board, nothing leaves this process
    Sim,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Ping the board
    Alive,
    /// Configure both FPGAs and start the bus server
    Bringup(BringupArgs),
    Info(InfoArgs),
    Read(ReadArgs),
    Write(WriteArgs),
    /// Reset the Spartan6 from the Microzed
    SoftReset,
    /// Read out DRS4 events on software triggers
    Readout(ReadoutArgs),
}

#[derive(clap::Args)]
struct BringupArgs {
    /// Spartan6 bitstream, relative to the remote directory
    #[arg(long, default_value = "rocstar.bin")]
    fpgabin: String,
    #[arg(long, default_value = "/mnt/uzed")]
    remote_dir: String,
    /// Only run the bus checks and the soft reset
    #[arg(long)]
    skip_config: bool,
}

#[derive(clap::Args)]
struct InfoArgs {
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct ReadArgs {
    space: Space,
    #[arg(value_parser = parse_hex)]
    addr: u16,
}

#[derive(clap::Args)]
struct WriteArgs {
    space: Space,
    #[arg(value_parser = parse_hex)]
    addr: u16,
    #[arg(value_parser = parse_hex)]
    value: u16,
}

#[derive(clap::Args)]
struct ReadoutArgs {
    /// DRS to arm, 0 (A) or 1 (B)
    #[arg(long, default_value_t = 0)]
    subunit: u8,
    #[arg(long, default_value_t = 4)]
    channel: u8,
    #[arg(long, default_value_t = 1023)]
    cells: u16,
    #[arg(long, value_enum, default_value_t)]
    calibration: CalibrationMode,
    /// Number of triggers
    #[arg(long, default_value_t = 1)]
    count: usize,
    /// Trigger generator, run as `<cmd> <board> mode <n>` and `<cmd> <board> pulse`
    #[arg(long)]
    trigger_cmd: Option<PathBuf>,
    #[arg(long, default_value_t = 1000)]
    trigger_timeout_ms: u64,
    #[arg(long, default_value_t = 4096)]
    max_drain_iterations: usize,
    #[arg(long)]
    json: bool,
}

type DynBus = Bus<Box<dyn Transport>>;

fn main() -> Result<()> {
    init_logging()?;
    let Args { global, command } = Args::parse();
    smol::block_on(run(global, command))
}

async fn run(global: GlobalOpts, command: CliCommand) -> Result<()> {
    let sim = matches!(global.backend, Backend::Sim).then(SimulatedBoard::new);
    let host = global.board.to_string();

    match command {
        CliCommand::Alive => {
            let alive = match sim {
                Some(_) => true,
                None => bringup::is_alive(&host).await?,
            };
            println!("{host}: {}", if alive { "alive" } else { "dead" });
        }
        CliCommand::Bringup(args) => {
            if !args.skip_config {
                let options = BringupOptions {
                    remote_dir: args.remote_dir,
                    fpgabin: args.fpgabin,
                    ..BringupOptions::default()
                };
                bring_up(sim.as_ref(), &host, options).await?;
            }
            let mut bus = connect(&global, sim.as_ref()).await?;
            checks::verify_microzed(&mut bus).await?;
            checks::verify_spartan6(&mut bus).await?;
            checks::soft_reset_spartan6(&mut bus).await?;
        }
        CliCommand::Info(args) => {
            let mut bus = connect(&global, sim.as_ref()).await?;
            let info: BoardInfo = rocstar_board::read(&mut bus).await?;
            print(&info, args.json)?;
        }
        CliCommand::Read(args) => {
            let mut bus = connect(&global, sim.as_ref()).await?;
            let reg = Reg::new(args.space, args.addr);
            println!("{reg} = {}", Hex(bus.read(reg).await?));
        }
        CliCommand::Write(args) => {
            let mut bus = connect(&global, sim.as_ref()).await?;
            bus.write(Reg::new(args.space, args.addr), args.value)
                .await?;
        }
        CliCommand::SoftReset => {
            let mut bus = connect(&global, sim.as_ref()).await?;
            checks::soft_reset_spartan6(&mut bus).await?;
        }
        CliCommand::Readout(args) => {
            let mut bus = connect(&global, sim.as_ref()).await?;
            let mut trigger: Box<dyn TriggerSource> = match (&sim, &args.trigger_cmd) {
                (Some(board), _) => Box::new(board.trigger()),
                (None, Some(cmd)) => Box::new(CommandTrigger::new(cmd, host.clone())),
                (None, None) => bail!("--trigger-cmd is required with the tcp backend"),
            };
            readout(&mut bus, &mut trigger, &args, global.no_progress_bar).await?;
        }
    }

    Ok(())
}

async fn connect(global: &GlobalOpts, sim: Option<&SimulatedBoard>) -> Result<DynBus> {
    let timeout = Duration::from_millis(global.timeout_ms);
    let transport: Box<dyn Transport> = match sim {
        Some(board) => Box::new(board.transport()),
        None => {
            let peer = SocketAddr::new(global.board.0.into(), global.port);
            let tcp = TcpTransport::connect(peer, timeout)
                .await
                .wrap_err_with(|| format!("failed to reach bus server at {peer}"))?;
            Box::new(tcp)
        }
    };
    Ok(Bus::new(transport).with_timeout(timeout))
}

async fn bring_up(sim: Option<&SimulatedBoard>, host: &str, options: BringupOptions) -> Result<()> {
    let prompt = bringup::prompt_for(host);
    let session: Box<dyn Session> = match sim {
        Some(board) => Box::new(board.session(&options, &prompt)),
        None => {
            if !bringup::is_alive(host).await? {
                bail!("{host} does not answer ping, power it on first");
            }
            let transcript = bringup::transcript_for(host);
            let file = std::fs::File::create(&transcript)
                .wrap_err_with(|| format!("failed to create {transcript}"))?;
            Box::new(SshSession::new("root", host, &prompt).with_transcript(file))
        }
    };
    // the simulated board is configured the moment it exists
    let options = match sim {
        Some(_) => BringupOptions {
            settle: Duration::ZERO,
            server_wait: Duration::ZERO,
            ..options
        },
        None => options,
    };
    Bringup::new(session, options).run().await?;
    info!("{host} is up");
    Ok(())
}

async fn readout(
    bus: &mut DynBus,
    trigger: &mut Box<dyn TriggerSource>,
    args: &ReadoutArgs,
    no_progress_bar: bool,
) -> Result<()> {
    let config = DigitizerConfig::new(args.channel, args.cells, args.calibration)?;
    let limits = ReadoutLimits {
        trigger_timeout: Duration::from_millis(args.trigger_timeout_ms),
        max_drain_iterations: args.max_drain_iterations,
        ..ReadoutLimits::default()
    };
    config.apply(bus, trigger).await?;

    let pb = (!no_progress_bar && !args.json && args.count > 1)
        .then(|| setup_progress_bar(args.count as u64));
    let mut seq = Sequencer::new(bus, trigger, &config).with_limits(limits);
    for _ in 0..args.count {
        let event = seq.run(args.subunit).await?;
        match &pb {
            Some(pb) => {
                pb.suspend(|| print(&event, args.json))?;
                pb.inc(1);
            }
            None => print(&event, args.json)?,
        }
    }
    Ok(())
}

fn print<'a, T: facet::Facet<'a>>(value: &T, json: bool) -> Result<()> {
    if json {
        let json = facet_json::to_string(value).map_err(|e| eyre!("failed to serialize: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", value.pretty());
    }
    Ok(())
}

fn setup_progress_bar(len: u64) -> indicatif::ProgressBar {
    let template = "{spinner:.green} {elapsed:>3} {bar} {pos}/{len} events ({per_sec})";
    let pb = indicatif::ProgressBar::new(len).with_finish(indicatif::ProgressFinish::Abandon);
    if let Ok(style) = indicatif::ProgressStyle::with_template(template) {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();
    color_eyre::install()?;
    Ok(())
}
