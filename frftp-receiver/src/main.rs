//! FRFTP receiver binary: binds a UDP socket, accepts a single incoming
//! session, and reassembles it to disk by driving
//! [`frftp_core::receiver::ReceiverEngine`] against each arriving
//! datagram.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use frftp_core::io::file::FileSink;
use frftp_core::io::udp::UdpDatagramSocket;
use frftp_core::io::DatagramSocket;
use frftp_core::receiver::ReceiverEngine;
use frftp_core::session::ReceiverConfig;
use frftp_core::FrftpError;

/// Receive buffer sized well above any frame this protocol ever sends.
const RECV_BUF_LEN: usize = 2048;

#[derive(Parser, Debug)]
#[command(name = "frftp-receiver", about = "Receive a file over FRFTP")]
struct Args {
    /// Destination path for the reassembled file.
    out_file: PathBuf,

    /// UDP port to bind and listen on.
    #[arg(long = "bind-port", env = "FRFTP_BIND_PORT", default_value_t = 9000)]
    bind_port: u16,

    /// Path MTU in bytes; payload_max is derived from this.
    #[arg(long, default_value_t = 1500)]
    mtu: u32,

    /// Retransmission timeout in milliseconds — bounds how long a single
    /// idle poll waits before the receive loop checks for shutdown.
    #[arg(long = "rto-ms", default_value_t = 300)]
    rto_ms: u64,

    /// Request the zero-copy send path where the socket adapter supports it.
    #[arg(long, default_value_t = false)]
    zerocopy: bool,

    /// Write final session statistics as JSON to this path.
    #[arg(long = "stats-json")]
    stats_json: Option<PathBuf>,

    /// Base log level used when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Log verbosity; repeat for more (-v, -vv). Overridden by RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(log_level: &str, verbose: u8) {
    let default_level = match verbose {
        0 => format!("frftp_receiver={log_level},frftp_core={log_level}"),
        1 => "frftp_receiver=debug,frftp_core=debug".to_string(),
        _ => "frftp_receiver=trace,frftp_core=trace".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}

/// Background-thread SIGINT/SIGTERM wait, mirroring the teacher binaries'
/// local `ctrlc` helper: a signal thread blocks in `sigwait` and runs `f`
/// once, instead of installing an async-signal-unsafe handler.
mod ctrlc {
    use std::sync::atomic::{AtomicBool, Ordering};

    static HANDLER_SET: AtomicBool = AtomicBool::new(false);

    pub fn handle(f: impl Fn() + Send + 'static) {
        if HANDLER_SET.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = std::thread::Builder::new()
            .name("signal".into())
            .spawn(move || {
                wait_for_signal();
                f();
            });
    }

    #[cfg(unix)]
    fn wait_for_signal() {
        unsafe {
            let mut mask: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut mask);
            libc::sigaddset(&mut mask, libc::SIGINT);
            libc::sigaddset(&mut mask, libc::SIGTERM);
            let mut sig: libc::c_int = 0;
            libc::sigwait(&mask, &mut sig);
        }
    }

    #[cfg(not(unix))]
    fn wait_for_signal() {
        loop {
            std::thread::sleep(std::time::Duration::from_secs(3600));
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level, args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<FrftpError>() {
                Some(FrftpError::Cancelled) => info!("session cancelled by user"),
                _ => error!(error = %err, "session failed"),
            }
            let code = err
                .downcast_ref::<FrftpError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = format!("0.0.0.0:{}", args.bind_port).parse()?;
    let mut socket = UdpDatagramSocket::bind(bind_addr)?;
    info!(local = %socket.local_addr()?, "listening");

    let sink = FileSink::create(&args.out_file)?;
    let config = ReceiverConfig {
        bind_port: args.bind_port,
        mtu: args.mtu,
        rto_ms: args.rto_ms,
        zerocopy: args.zerocopy,
    };
    let mut engine = ReceiverEngine::new(config, sink);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::handle(move || {
            info!("Ctrl-C received, finishing current tick then exiting");
            running.store(false, Ordering::Relaxed);
        });
    }

    let poll_timeout = Duration::from_millis(args.rto_ms);
    let mut buf = [0u8; RECV_BUF_LEN];
    let mut peer: Option<SocketAddr> = None;

    while !engine.is_complete() {
        if !running.load(Ordering::Relaxed) {
            return Err(FrftpError::Cancelled.into());
        }
        let Some((len, from)) = socket.recv_timeout(&mut buf, poll_timeout)? else {
            continue;
        };
        if let Some(ack) = engine.handle_datagram(&buf[..len], from)? {
            peer = Some(from);
            socket.set_peer(from);
            let send = if args.zerocopy {
                socket.send_to_zerocopy(&ack)
            } else {
                socket.send_to(&ack)
            };
            if let Err(e) = send {
                tracing::warn!(error = %e, "failed to send ACK, will retry on next datagram");
            }
        }
    }

    engine.verify_size()?;
    info!(peer = ?peer, "transfer complete");

    if let Some(path) = args.stats_json {
        std::fs::write(&path, serde_json::to_string_pretty(&engine.stats)?)?;
    }

    Ok(())
}
