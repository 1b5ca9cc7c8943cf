// Command-line driver (spec §10.1/§10.3): wires `DecoderConfig` and
// `Decoder` together, reads a raw elementary stream from disk and writes the
// decoded frames, in display order, as YUV4MPEG2.
//
// Container demuxing is explicitly out of scope (§1), so the input file is
// expected to already be framed the way each codec's `decode_frame` wants it:
// one concatenated run of Dirac data units, or one VP3/Theora frame packet
// per `decode_frame` call for a stream with an external framer. Since no
// framer is in scope either, the whole byte buffer is repeatedly narrowed by
// each call's own `consumed` count.

mod array2d;
mod bitreader;
mod block;
mod config;
mod decoder;
mod dirac;
mod error;
mod frame;
mod reftable;
mod transform;
mod util;
mod vlc;
mod vp3;
mod y4m;

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use config::{ChromaFormat, CodecVariant, DecoderConfig};
use decoder::Decoder;
use y4m::Y4MWriter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodecArg {
  Dirac,
  Vp3,
}

impl From<CodecArg> for CodecVariant {
  fn from(value: CodecArg) -> Self {
    match value {
      CodecArg::Dirac => CodecVariant::Dirac,
      CodecArg::Vp3 => CodecVariant::Vp3Theora,
    }
  }
}

/// Decode a raw Dirac or VP3/Theora elementary stream to YUV4MPEG2.
#[derive(Parser, Debug)]
struct Args {
  /// Path to the coded elementary stream.
  input: PathBuf,

  /// Path to write decoded YUV4MPEG2 output to.
  output: PathBuf,

  /// Which codec the input stream carries.
  #[arg(long, value_enum)]
  codec: CodecArg,

  /// Picture width in pixels. Ignored for Dirac once a sequence header has
  /// been seen, since Dirac carries its own geometry.
  #[arg(long)]
  width: usize,

  /// Picture height in pixels. See `--width`.
  #[arg(long)]
  height: usize,

  /// Theora's three-packet Xiph extradata blob (identification + comment +
  /// setup, concatenated). Unused for Dirac.
  #[arg(long)]
  extradata: Option<PathBuf>,

  /// Reference-frame table capacity override. 0 selects the codec default.
  #[arg(long, default_value_t = 0)]
  max_reference_frames: usize,
}

fn main() {
  env_logger::init();

  let args = Args::parse();

  if let Err(err) = run(&args) {
    log::error!("decode failed: {}", err);
    std::process::exit(1);
  }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
  let mut input_data = Vec::new();
  File::open(&args.input)?.read_to_end(&mut input_data)?;

  let extradata: Box<[u8]> = match &args.extradata {
    Some(path) => {
      let mut buf = Vec::new();
      File::open(path)?.read_to_end(&mut buf)?;
      buf.into_boxed_slice()
    }
    None => Box::new([]),
  };

  let mut config = DecoderConfig::new(args.width, args.height, ChromaFormat::Yuv420, args.codec.into()).with_extradata(extradata);
  if args.max_reference_frames != 0 {
    config = config.with_max_reference_frames(args.max_reference_frames);
  }

  let mut decoder = Decoder::init(config)?;
  let output_file = BufWriter::new(File::create(&args.output)?);
  let mut writer = Y4MWriter::new(output_file, args.width, args.height)?;

  let mut cursor = 0usize;
  let mut frame_count = 0u64;

  while cursor < input_data.len() {
    let (frame, consumed) = decoder.decode_frame(&input_data[cursor..])?;
    if consumed == 0 {
      log::warn!("decoder made no progress at offset {}, stopping", cursor);
      break;
    }
    cursor += consumed;
    if let Some(frame) = frame {
      log::debug!("decoded frame, display_number={}", frame.display_number);
    }
    drain_ready_frames(&mut decoder, &mut writer, &mut frame_count)?;
  }

  // The stream is exhausted, but reordered frames may still be waiting in
  // the reference table for their display slot.
  drain_ready_frames(&mut decoder, &mut writer, &mut frame_count)?;

  decoder.end();
  log::info!("wrote {} frames", frame_count);
  Ok(())
}

fn drain_ready_frames<W: std::io::Write>(decoder: &mut Decoder, writer: &mut Y4MWriter<W>, frame_count: &mut u64) -> Result<bool, Box<dyn std::error::Error>> {
  let mut drained_any = false;
  loop {
    let (frame, _) = decoder.decode_frame(&[])?;
    match frame {
      Some(frame) => {
        writer.write_frame(&frame)?;
        *frame_count += 1;
        drained_any = true;
      }
      None => break,
    }
  }
  Ok(drained_any)
}
