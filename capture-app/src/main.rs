// netsdr capture tool -- connects to a NetSDR-protocol receiver, streams IQ
// samples and writes them to a raw little-endian file.
//
// Usage:
//   netsdr-capture --host 192.168.1.50 --frequency 7100000 --duration 10
//   netsdr-capture --host 192.168.1.50 --bits 24 --sample-rate 250000 \
//       --output capture.iq
//   RUST_LOG=netsdr=trace netsdr-capture --host 192.168.1.50
//
// 16-bit captures are written as i16 LE, 24-bit captures as i32 LE, with
// I and Q interleaved as the receiver sends them.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing_subscriber::EnvFilter;

use netsdr::builder::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use netsdr::client::DEFAULT_SAMPLE_RATE;
use netsdr::{IqPacket, NetSdrBuilder, NetSdrClient, SampleFormat};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Capture IQ samples from a NetSDR-protocol receiver.
#[derive(Parser, Debug)]
#[command(name = "netsdr-capture", version, about)]
struct Cli {
    /// Receiver IP address or hostname.
    #[arg(long)]
    host: String,

    /// TCP control port.
    #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Local UDP port the receiver sends IQ data to.
    #[arg(long, default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

    /// Tune to this frequency (Hz) before streaming.
    #[arg(long)]
    frequency: Option<u64>,

    /// Receiver channel to tune.
    #[arg(long, default_value_t = 0)]
    channel: u8,

    /// IQ output sample rate (samples/s).
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Sample width: 16 or 24.
    #[arg(long, default_value = "16", value_parser = parse_bits)]
    bits: SampleFormat,

    /// Stop after this many seconds. Without it, capture runs until Ctrl-C.
    #[arg(long)]
    duration: Option<u64>,

    /// Output file.
    #[arg(long, default_value = "samples.bin")]
    output: String,

    /// Log session activity at debug level.
    #[arg(long, short)]
    verbose: bool,
}

/// Parse "16" or "24" into a sample format.
fn parse_bits(s: &str) -> std::result::Result<SampleFormat, String> {
    match s {
        "16" => Ok(SampleFormat::Bits16),
        "24" => Ok(SampleFormat::Bits24),
        other => Err(format!("unsupported sample width {other}: use 16 or 24")),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "netsdr=debug,netsdr_transport=debug,netsdr_capture=debug"
    } else {
        "netsdr=info,netsdr_capture=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ---------------------------------------------------------------------------
// Sample output
// ---------------------------------------------------------------------------

/// Append `samples` to `out` in the on-disk layout for `format`.
fn encode_samples(format: SampleFormat, samples: &[i32], out: &mut Vec<u8>) {
    match format {
        SampleFormat::Bits16 => {
            for &s in samples {
                out.extend_from_slice(&(s as i16).to_le_bytes());
            }
        }
        SampleFormat::Bits24 => {
            for &s in samples {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
}

#[derive(Debug, Default)]
struct CaptureTotals {
    packets: u64,
    samples: u64,
    bytes: u64,
}

async fn write_packet(
    writer: &mut BufWriter<File>,
    format: SampleFormat,
    packet: &IqPacket,
    scratch: &mut Vec<u8>,
    totals: &mut CaptureTotals,
) -> Result<()> {
    scratch.clear();
    encode_samples(format, &packet.samples, scratch);
    writer
        .write_all(scratch)
        .await
        .context("failed to write samples")?;

    totals.packets += 1;
    totals.samples += packet.samples.len() as u64;
    totals.bytes += scratch.len() as u64;
    Ok(())
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

async fn capture(client: &NetSdrClient, cli: &Cli) -> Result<CaptureTotals> {
    let Some(mut packets) = client.iq_stream() else {
        bail!("IQ stream already taken");
    };

    let file = File::create(&cli.output)
        .await
        .with_context(|| format!("failed to create output file: {}", cli.output))?;
    let mut writer = BufWriter::new(file);
    let mut scratch = Vec::new();
    let mut totals = CaptureTotals::default();

    client
        .start_iq()
        .await
        .context("failed to start IQ streaming")?;

    match cli.duration {
        Some(secs) => println!("Capturing {} seconds to {} ...", secs, cli.output),
        None => println!("Capturing to {} (Ctrl-C to stop) ...", cli.output),
    }

    let deadline = cli
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    let sleep = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(sleep);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            packet = packets.recv() => match packet {
                Some(packet) => {
                    write_packet(&mut writer, cli.bits, &packet, &mut scratch, &mut totals).await?;
                }
                None => {
                    println!("IQ stream closed.");
                    break;
                }
            },
            _ = &mut sleep => break,
            _ = &mut ctrl_c => {
                println!();
                println!("Interrupted.");
                break;
            }
        }
        if !client.is_streaming() {
            tracing::warn!("Session stopped streaming, ending capture");
            break;
        }
    }

    // Keep whatever is already queued.
    while let Ok(packet) = packets.try_recv() {
        write_packet(&mut writer, cli.bits, &packet, &mut scratch, &mut totals).await?;
    }
    writer.flush().await.context("failed to flush output file")?;

    if client.is_streaming() {
        client
            .stop_iq()
            .await
            .context("failed to stop IQ streaming")?;
    }
    Ok(totals)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let client = NetSdrBuilder::new()
        .host(&cli.host)
        .tcp_port(cli.port)
        .udp_port(cli.udp_port)
        .sample_rate(cli.sample_rate)
        .sample_format(cli.bits)
        .build()
        .await
        .context("failed to set up session")?;

    let started = Instant::now();
    client
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;
    println!(
        "Connected to {}:{} (sample rate {} S/s, {}-bit)",
        cli.host,
        cli.port,
        cli.sample_rate,
        cli.bits.bit_depth()
    );

    if let Some(frequency) = cli.frequency {
        client
            .change_frequency(frequency, cli.channel)
            .await
            .with_context(|| {
                format!("failed to tune channel {} to {} Hz", cli.channel, frequency)
            })?;
        println!("Tuned channel {} to {} Hz", cli.channel, frequency);
    }

    let result = capture(&client, &cli).await;
    client.disconnect().await.ok();
    let totals = result?;

    let stats = client.stream_stats();
    let elapsed = started.elapsed();
    println!();
    println!("Capture summary:");
    println!("  Packets:        {}", totals.packets);
    println!("  Samples:        {}", totals.samples);
    println!("  Bytes written:  {}", totals.bytes);
    println!("  Lost packets:   {}", stats.lost);
    println!("  Decode errors:  {}", stats.decode_errors);
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
