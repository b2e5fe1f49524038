use clap::Parser;
use colored::Colorize;
use hdcp1x_core::{Interface, StreamMap};
use hdcp1x_hal::LinkEvents;
use hdcp1x_sim::{session, Downstream, HostPlatform, SimLink, DEFAULT_BKSV};
use hdcp1x_tx::{StateId, Transmitter, TxConfig};
use log::{info, warn};
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::{Duration, Instant};

/// How often the simulated link raises its Ri tick once authenticated.
const CHECK_PERIOD: Duration = Duration::from_millis(100);
/// Gives up if authentication has not settled by then.
const AUTH_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(about = "Authenticate a transmitter against a simulated receiver")]
struct Cli {
    /// HDMI register map and Ri interrupts (default: DisplayPort).
    #[arg(long)] hdmi: bool,
    /// Put a repeater in front of the receiver.
    #[arg(long)] repeater: bool,
    #[arg(long, default_value_t = 1)] devices: u8,
    #[arg(long, default_value_t = 1)] depth: u8,
    /// Put the receiver key on the revocation list.
    #[arg(long)] revoke: bool,
    /// Corrupt one V' word (0-4).
    #[arg(long)] corrupt_v: Option<usize>,
    /// Ri' mismatches to inject at the first link check.
    #[arg(long, default_value_t = 0)] ri_mismatch: u32,
    /// Topology polls before the repeater reports ready.
    #[arg(long, default_value_t = 0)] ready_after: u32,
    /// Link checks to run before exiting (0: until Ctrl-C).
    #[arg(long, default_value_t = 5)] checks: u32,
    /// Streams to encrypt, as a bit map.
    #[arg(long, default_value = "0x1", value_parser = parse_map)] streams: StreamMap,
}

fn parse_map(s: &str) -> Result<StreamMap, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => StreamMap::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn build_link(cli: &Cli, interface: Interface) -> SimLink {
    let link = SimLink::new(interface);
    if cli.repeater {
        let mut rng = rand::thread_rng();
        let ksvs = (0..cli.devices).map(|_| session::random_ksv(&mut rng)).collect();
        link.set_downstream(Some(Downstream::new(ksvs, cli.depth)));
        link.set_ready_after(cli.ready_after);
    }
    link.corrupt_v_word(cli.corrupt_v);
    link
}

/// Raises the link and enables the transmitter, then lets one poll settle
/// it in UNAUTHENTICATED before asking for authentication. Posted together,
/// AUTHENTICATE would dispatch ahead of ENABLE and PHYUP and be dropped.
fn bring_up(tx: &mut Transmitter, streams: StreamMap) -> anyhow::Result<()> {
    tx.set_physical_state(true);
    tx.enable();
    tx.poll();
    tx.enable_encryption(streams)?;
    tx.authenticate();
    Ok(())
}

/// UNAUTHENTICATED only means failure once an attempt has been under way.
fn attempt_failed(attempted: bool, state: StateId) -> bool {
    attempted && state == StateId::Unauthenticated
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    if cli.corrupt_v.map_or(false, |w| w >= 5) {
        anyhow::bail!("--corrupt-v takes a word index 0-4");
    }

    let interface = if cli.hdmi { Interface::Hdmi } else { Interface::DisplayPort };
    let link = build_link(&cli, interface);
    let platform = HostPlatform::new().realtime();
    if cli.revoke {
        platform.revoke(DEFAULT_BKSV);
    }
    let timer = platform.timer();

    let mut tx = Transmitter::new(
        Box::new(link.receiver()),
        Box::new(link.cipher()),
        Box::new(platform.clone()),
        TxConfig { device_id: 0, interface },
    );
    info!(">>> HDCP TX SIM: {} ({}) <<<", interface.name(), if cli.repeater { "repeater" } else { "receiver" });

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    bring_up(&mut tx, cli.streams)?;

    let started = Instant::now();
    let mut last_state = tx.state();
    let mut last_tick = Instant::now();
    let mut checks_done = 0u32;
    let mut mismatch_armed = cli.ri_mismatch > 0;
    let mut attempted = false;

    while running.load(Ordering::SeqCst) {
        if timer.take_expired() {
            tx.handle_timeout();
        }
        tx.poll();

        let state = tx.state();
        if state != last_state {
            let line = format!("{} -> {}", last_state, state);
            match state {
                StateId::Authenticated => println!("{}", line.green()),
                StateId::Unauthenticated | StateId::PhyDown => println!("{}", line.red()),
                _ => println!("{}", line.dimmed()),
            }
            last_state = state;
        }

        attempted |= tx.is_in_progress() || tx.is_authenticated();
        if attempt_failed(attempted, state) {
            println!("{}", "authentication failed".red().bold());
            break;
        }

        if tx.is_authenticated() {
            if last_tick.elapsed() >= CHECK_PERIOD {
                if mismatch_armed {
                    link.mismatch_ri(cli.ri_mismatch);
                    mismatch_armed = false;
                }
                // DisplayPort has no Ri interrupt: deliver the tick by hand.
                link.frame_tick();
                if interface == Interface::DisplayPort {
                    tx.notifier().check_link();
                }
                checks_done += 1;
                last_tick = Instant::now();
            }
            if cli.checks > 0 && checks_done >= cli.checks {
                // let the last check land
                tx.poll();
                break;
            }
        } else if started.elapsed() > AUTH_DEADLINE && checks_done == 0 {
            warn!("Authentication stuck in {}", state);
            break;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    println!("{}", "--- transmitter ---".bold());
    println!("{}", tx.info());

    let stats = tx.stats();
    let summary = format!(
        "passed {} / failed {} / link checks {} ok, {} failed",
        stats.auth_passed, stats.auth_failed, stats.link_check_passed, stats.link_check_failed
    );
    if tx.is_authenticated() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
    Ok(())
}
