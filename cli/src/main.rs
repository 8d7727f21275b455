//! Command-line driver: find the plotter, ingest an SVG if given, and
//! walk the boot → cut → eject sequence.

mod discover;

use std::path::PathBuf;
use std::process::exit;

use colored::*;
use licut_core::{
    session, CommandLayer, NoiseGenerator, SerialTransport, SessionConfig,
};
use structopt::StructOpt;

const VERSION: &str = "0.15";

/// Drive a Cricut-family die-cutting plotter over its serial command
/// channel.
#[derive(Debug, StructOpt)]
struct App {
    /// Verbose mode; repeat for more diagnostic output
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,
    /// Send a final pen-up move to (0,0) before close
    #[structopt(long = "eject", default_value = "1")]
    eject: i32,
    /// Skip the 15s wait for manual pressure adjustment
    #[structopt(long = "quick", default_value = "0")]
    quick: i32,
    /// Drain between within-cubic 0x40 frames, in ms
    #[structopt(long = "intercurve", default_value = "10")]
    intercurve: u64,
    /// Drain between distinct cut commands, in ms
    #[structopt(long = "intercmd", default_value = "50")]
    intercmd: u64,
    /// Seed the fixed-noise generator with this value instead of drawing
    /// from the system CSPRNG
    #[structopt(long = "noise", default_value = "0")]
    noise: u32,
    /// Run the XXTEA self-test with this u32 value and exit, opening no
    /// serial port
    #[structopt(long = "xxtea_unittest", default_value = "0")]
    xxtea_unittest: u32,
    /// String payload for the XXTEA self-test
    #[structopt(long = "xxtea_unittest_str", default_value = "")]
    xxtea_unittest_str: String,
    /// Inkscape-exported SVG file to cut
    svg_path: Option<PathBuf>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .init();
}

fn main() {
    let app = App::from_args();
    init_logging(app.verbose);

    println!("{}", format!("licut v{}", VERSION).bold());

    if app.xxtea_unittest != 0 {
        run_xxtea_self_test(app.xxtea_unittest, &app.xxtea_unittest_str);
        exit(0);
    }

    let document = app.svg_path.as_ref().and_then(|path| {
        match std::fs::read_to_string(path).map_err(licut_core::Error::Io).and_then(|src| {
            licut_core::svg::parse(&src)
        }) {
            Ok(doc) => {
                println!("Result of parsing {}: OK", path.display());
                Some(doc)
            }
            Err(e) => {
                eprintln!("Result of parsing {}: failed ({})", path.display(), e);
                None
            }
        }
    });

    let device_path = match discover::find_device() {
        Some(path) => path,
        None => {
            eprintln!(
                "{}",
                "Failed to open: could not find FTDI USB serial device - is the device turned on and connected?"
                    .red()
            );
            exit(-1);
        }
    };

    let mut transport = match SerialTransport::open(&device_path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", format!("Failed to open: {}", e).red());
            exit(-1);
        }
    };

    let noise = if app.noise != 0 {
        println!(
            "Setting start value for fixed pseudo (non-random) noise to {}",
            app.noise
        );
        NoiseGenerator::fixed(app.noise)
    } else {
        NoiseGenerator::random()
    };
    let mut layer = CommandLayer::new(noise);

    let config = SessionConfig {
        eject: app.eject != 0,
        quick: app.quick != 0,
        intercommand_ms: app.intercmd,
        intercurve_ms: app.intercurve,
    };

    let mut operator = session::ConsoleOperator;
    match session::run(&mut transport, &mut layer, &mut operator, &config, document.as_ref()) {
        Ok(_) => exit(0),
        Err(e) => {
            eprintln!("{}", format!("{}", e).red());
            exit(1);
        }
    }
}

/// Reproduce `main.cpp`'s chained XXTEA self-test: encrypt a fixed u32
/// with key 0, splice `xxtea_unittest_str` (or a known fixture) into the
/// working buffer, and re-encrypt with keys 1 and 2, dumping hex after
/// each step. Returns the key-0 stage's ciphertext as a hex string.
fn run_xxtea_self_test(seed: u32, payload_str: &str) -> String {
    println!("Running unit test with input value {:#010x}", seed);
    let mut v = [seed, 0, 0];

    licut_core::xxtea::encrypt(&mut v, &licut_core::xxtea::COMMAND_KEYS[0]);
    let key0_hex = hex_string(&words_to_bytes(&v));
    dump_hex("Cryptext: ", &words_to_bytes(&v));

    println!("Plaintext string: {}", payload_str);
    let mut bytes = words_to_bytes(&v);
    for (i, b) in payload_str.bytes().take(12).enumerate() {
        bytes[i] = b;
    }
    v = bytes_to_words(&bytes);
    licut_core::xxtea::encrypt(&mut v, &licut_core::xxtea::COMMAND_KEYS[1]);
    dump_hex("Cryptext: ", &words_to_bytes(&v));

    let fixture: [u8; 12] = [
        0x11, 0x27, 0x00, 0x00, 0xE3, 0x02, 0x00, 0x00, 0x84, 0x01, 0x00, 0x00,
    ];
    v = bytes_to_words(&fixture);
    dump_hex("Plaintext: ", &words_to_bytes(&v));
    licut_core::xxtea::encrypt(&mut v, &licut_core::xxtea::COMMAND_KEYS[2]);
    dump_hex("Cryptext: ", &words_to_bytes(&v));

    key0_hex
}

fn words_to_bytes(words: &[u32; 3]) -> [u8; 12] {
    let mut out = [0u8; 12];
    for (i, w) in words.iter().enumerate() {
        licut_core::endian::u32_le_write(*w, &mut out[i * 4..i * 4 + 4]);
    }
    out
}

fn bytes_to_words(bytes: &[u8; 12]) -> [u32; 3] {
    let mut out = [0u32; 3];
    for i in 0..3 {
        out[i] = licut_core::endian::u32_le_read(&bytes[i * 4..i * 4 + 4]);
    }
    out
}

fn dump_hex(label: &str, bytes: &[u8]) {
    print!("{}", label);
    for b in bytes {
        print!("{:02x} ", b);
    }
    println!();
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
