use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use serde_json::json;

use seekable::opts::DEFAULT_BUFFER_SIZE;
use seekable::{
    MediaSession, ReqwestTransport, SeekDirection, SessionOpts, StreamSelector, SymphoniaEngine,
};

/// Code for failures outside the library, such as a closed stdout.
const OUTPUT_ERROR: &str = "OUTPUT_ERROR";

#[tokio::main]
async fn main() -> ExitCode {
    let params = Params::parse();
    seekable::logging::init(seekable::logging::level_for_verbosity(params.verbose));

    match run(&params).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error_line(&params.url, &err));
            ExitCode::FAILURE
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "seekable")]
#[command(about = "Inspect and stream packets from remote media over HTTP range requests")]
struct Params {
    #[arg(short = 'u', long = "url")]
    pub url: String,

    #[arg(short = 'b', long = "buffer-size", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// Look up the packet at each of these timestamps (seconds).
    #[arg(long = "at", num_args = 1..)]
    pub at: Vec<f64>,

    /// Stream packets starting here (seconds).
    #[arg(long = "stream-start")]
    pub stream_start: Option<f64>,

    /// Stop streaming after this timestamp; 0 streams to the end.
    #[arg(long = "stream-end", default_value_t = 0.0)]
    pub stream_end: f64,

    /// Use this stream index instead of the first audio stream.
    #[arg(short = 's', long = "stream")]
    pub stream: Option<usize>,

    #[arg(long = "high-water-mark", default_value_t = seekable::opts::DEFAULT_HIGH_WATER_MARK)]
    pub high_water_mark: usize,

    /// Land seeks on the cheapest reachable position instead of the preceding packet.
    #[arg(long = "nearest", default_value_t = false)]
    pub nearest: bool,

    /// Per-request HTTP timeout in seconds.
    #[arg(long = "timeout", default_value_t = 30)]
    pub timeout_secs: u64,

    /// More log output on stderr; repeat for more.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Params {
    fn session_opts(&self) -> SessionOpts {
        SessionOpts {
            stream: self
                .stream
                .map_or(StreamSelector::Best, StreamSelector::Index),
            seek_direction: if self.nearest {
                SeekDirection::Nearest
            } else {
                SeekDirection::Backward
            },
            high_water_mark: self.high_water_mark,
            ..SessionOpts::default()
        }
    }
}

async fn run(params: &Params) -> Result<()> {
    let transport = ReqwestTransport::with_timeout(std::time::Duration::from_secs(
        params.timeout_secs,
    ))
    .map_err(|e| {
        seekable::Error::new(
            seekable::ErrorKind::TransportError,
            format!("failed to build HTTP client: {e}"),
        )
        .with_source(e)
    })?;

    let mut session = MediaSession::with_engine(
        SymphoniaEngine::bootstrap(),
        Arc::new(transport),
        params.session_opts(),
    );
    session.load(params.url.as_str(), params.buffer_size).await?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let info = session.media_info().await?;
    emit(&mut out, json!({ "event": "media_info", "url": params.url, "info": info }))?;

    for &at in &params.at {
        let packet = session.packet_at(at).await?;
        emit(&mut out, json!({ "event": "packet_at", "at": at, "packet": packet }))?;
    }

    if let Some(start) = params.stream_start {
        let mut stream = session.create_av_stream(start, params.stream_end)?;
        let mime_type = stream.mime_type().to_owned();

        let mut count = 0usize;
        let mut bytes = 0usize;
        while let Some(packet) = stream.next().await {
            let packet = packet?;
            count += 1;
            bytes += packet.byte_length;
            emit(&mut out, json!({ "event": "packet", "packet": packet }))?;
        }
        emit(
            &mut out,
            json!({
                "event": "stream_end",
                "mime_type": mime_type,
                "packets": count,
                "bytes": bytes,
            }),
        )?;
    }

    session.destroy();
    Ok(())
}

fn emit(out: &mut impl Write, value: serde_json::Value) -> Result<()> {
    serde_json::to_writer(&mut *out, &value).context("failed to serialize output")?;
    out.write_all(b"\n").context("failed to write output")?;
    out.flush().context("failed to flush output")?;
    Ok(())
}

/// The JSON error line printed on stderr before a failing exit.
///
/// Library errors keep their own code and URL; anything else is an output failure.
fn error_line(url: &str, err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<seekable::Error>() {
        Some(err) => json!({
            "code": err.kind().code(),
            "message": err.message(),
            "url": err.url().unwrap_or(url),
        }),
        None => json!({
            "code": OUTPUT_ERROR,
            "message": format!("{err:#}"),
            "url": url,
        }),
    }
}
