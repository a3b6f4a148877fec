use clap::Parser;
use crossbeam::channel::{self, Receiver, Sender};
use midicue::{
    Error, PlaybackSignal, PlayerConfig, Session, Transport,
    output::{
        MidiPortTransport, Recording, RecordingTransport, SerialTransport, list_output_ports,
    },
};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Plays a MIDI file out of a serial port (or MIDI port) in real time.
///
/// While playing, type `pause`, `resume`, `stop` or `status` and press Enter.
#[derive(Debug, Parser)]
#[command(name = "midicue", version)]
struct Args {
    /// Standard MIDI file to play.
    #[arg(required_unless_present = "list_ports")]
    file: Option<PathBuf>,

    /// RON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overriding `serial.device` from the config.
    #[arg(long, conflicts_with_all = ["midi_port", "dry_run"])]
    device: Option<PathBuf>,

    /// Send to the OS MIDI output whose name contains this text.
    #[arg(long, conflicts_with = "dry_run")]
    midi_port: Option<String>,

    /// Schedule everything but write to memory only.
    #[arg(long)]
    dry_run: bool,

    /// Print the available MIDI output ports and exit.
    #[arg(long)]
    list_ports: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("midicue=info")),
        )
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> midicue::Result<ExitCode> {
    if args.list_ports {
        for name in list_output_ports()? {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let file = args
        .file
        .ok_or_else(|| Error::Config("no MIDI file given".into()))?;
    let mut config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    if let Some(device) = args.device {
        config.serial.device = device;
    }

    let mut dry_run: Option<Recording> = None;
    let transport: Box<dyn Transport> = if args.dry_run {
        let transport = RecordingTransport::discarding();
        dry_run = Some(transport.recording());
        Box::new(transport)
    } else if let Some(port) = args.midi_port {
        Box::new(MidiPortTransport::new(port))
    } else {
        Box::new(SerialTransport::new(config.serial.clone()))
    };
    tracing::info!(transport = %transport.describe(), "output selected");

    let status_interval = config.status_interval();
    let session = Session::new(transport, config);
    let signals = session.subscribe();
    session.load_file(&file)?;

    // Holding a sender keeps `commands` connected after stdin closes.
    let (command_tx, commands) = channel::unbounded();
    install_interrupt_handler(command_tx.clone());
    session.start()?;
    spawn_stdin_reader(command_tx.clone());
    let ticker = channel::tick(status_interval);

    let code = drive(&session, &signals, &commands, &ticker);

    if let Some(recording) = dry_run {
        tracing::info!(
            messages = recording.write_count(),
            bytes = recording.byte_count(),
            "dry run complete"
        );
    }
    Ok(code)
}

/// Runs until the session reports a terminal signal.
fn drive(
    session: &Session,
    signals: &Receiver<PlaybackSignal>,
    commands: &Receiver<String>,
    ticker: &Receiver<Instant>,
) -> ExitCode {
    loop {
        crossbeam::select! {
            recv(signals) -> signal => match signal {
                Ok(PlaybackSignal::Finished) | Ok(PlaybackSignal::Stopped) | Err(_) => {
                    return ExitCode::SUCCESS;
                }
                Ok(PlaybackSignal::Error { message }) => {
                    tracing::error!("playback aborted: {message}");
                    return ExitCode::FAILURE;
                }
                Ok(other) => tracing::debug!(?other, "signal"),
            },
            recv(commands) -> line => {
                if let Ok(line) = line {
                    handle_command(session, line.trim());
                }
            },
            recv(ticker) -> _ => {
                let status = session.status();
                tracing::info!(
                    position_ms = status.position.as_millis() as u64,
                    remaining_ms = status.remaining.map(|r| r.as_millis() as u64),
                    paused = status.is_paused,
                    "status"
                );
            },
        }
    }
}

fn handle_command(session: &Session, command: &str) {
    let ack = match command {
        "pause" => session.pause(),
        "resume" => session.resume(),
        "stop" | "quit" => session.stop(),
        "status" => {
            println!("{:#?}", session.status());
            return;
        }
        "" => return,
        other => {
            tracing::warn!("unknown command {other:?} (pause, resume, stop, status)");
            return;
        }
    };
    tracing::info!(command, ?ack, "command handled");
}

/// Ctrl-C and SIGTERM become a `stop`, so the session silences the output
/// before the process exits.
fn install_interrupt_handler(tx: Sender<String>) {
    let result = ctrlc::set_handler(move || {
        let _ = tx.send("stop".to_string());
    });
    if let Err(e) = result {
        tracing::warn!("failed to install interrupt handler: {e}");
    }
}

fn spawn_stdin_reader(tx: Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use midicue::{EventStream, MidiMessage, ScheduledEvent};
    use std::time::Duration;

    #[test]
    fn stop_command_silences_before_exit() {
        let transport = RecordingTransport::new();
        let recording = transport.recording();
        let session = Session::new(transport, PlayerConfig::default());
        let signals = session.subscribe();
        let events = vec![ScheduledEvent {
            offset: Duration::from_secs(10),
            payload: MidiMessage::NoteOn {
                key: 60,
                velocity: 100,
            }
            .encode(0),
        }];
        session
            .load_stream("long", EventStream::from_events(events, Some(Duration::from_secs(10))))
            .unwrap();

        // What the interrupt handler sends.
        let (tx, commands) = channel::unbounded();
        session.start().unwrap();
        tx.send("stop".to_string()).unwrap();
        let ticker = channel::tick(Duration::from_secs(60));
        let code = drive(&session, &signals, &commands, &ticker);

        assert_eq!(format!("{code:?}"), format!("{:?}", ExitCode::SUCCESS));
        let all_off = recording
            .messages()
            .iter()
            .filter(|m| m[0] & 0xF0 == 0xB0 && m[1] == 123)
            .count();
        // Three controlled channels, before start and after stop.
        assert_eq!(all_off, 6);
        assert!(recording.messages().iter().all(|m| m[0] & 0xF0 != 0x90));
    }
}
