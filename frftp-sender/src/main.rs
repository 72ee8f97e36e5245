//! FRFTP sender binary: reads a file from disk and ships it to a single
//! peer over UDP, driving [`frftp_core::sender::SenderEngine`] to
//! completion.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use frftp_core::io::file::FileSource;
use frftp_core::io::udp::UdpDatagramSocket;
use frftp_core::sender::SenderEngine;
use frftp_core::session::SenderConfig;
use frftp_core::FrftpError;

#[derive(Parser, Debug)]
#[command(name = "frftp-sender", about = "Send a file over FRFTP")]
struct Args {
    /// File to send.
    file: PathBuf,

    /// Receiver address, e.g. 127.0.0.1:9000.
    #[arg(long)]
    peer: SocketAddr,

    /// Local address to bind the sending socket to.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Path MTU in bytes; payload_max is derived from this.
    #[arg(long, default_value_t = 1500)]
    mtu: u32,

    /// Retransmission timeout in milliseconds.
    #[arg(long = "rto-ms", default_value_t = 300)]
    rto_ms: u64,

    /// Maximum send attempts per segment/handshake round before giving up.
    #[arg(long, default_value_t = 8)]
    retries: u32,

    /// Sliding window size in segments.
    #[arg(long, default_value_t = 32)]
    window: u32,

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
        0 => format!("frftp_sender={log_level},frftp_core={log_level}"),
        1 => "frftp_sender=debug,frftp_core=debug".to_string(),
        _ => "frftp_sender=trace,frftp_core=trace".to_string(),
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
                Some(FrftpError::Cancelled) => info!("transfer cancelled by user"),
                _ => error!(error = %err, "transfer failed"),
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
    let file_size = std::fs::metadata(&args.file)?.len();
    let source = FileSource::open(&args.file)?;

    let mut socket = UdpDatagramSocket::bind(args.bind)?;
    socket.set_peer(args.peer);

    let config = SenderConfig {
        peer_addr: args.peer,
        mtu: args.mtu,
        rto_ms: args.rto_ms,
        retries: args.retries,
        win: args.window,
        zerocopy: args.zerocopy,
    };

    let mut engine = SenderEngine::new(config, source, socket, file_size)?;

    let running = Arc::new(AtomicBool::new(true));
    engine.set_cancel_flag(running.clone());
    ctrlc::handle(move || {
        info!("Ctrl-C received, finishing current tick then exiting");
        running.store(false, Ordering::Relaxed);
    });

    engine.run()?;

    if let Some(path) = args.stats_json {
        std::fs::write(&path, serde_json::to_string_pretty(&engine.stats)?)?;
    }

    Ok(())
}
