//! Session orchestrator: the fixed boot sequence from transport-open
//! through cut-all-sets to eject and close.

use std::thread;
use std::time::Duration;

use log::info;

use crate::command::{Command, CommandLayer, Reply, SubCmd};
use crate::compiler::CutCompiler;
use crate::error::Result;
use crate::path::Document;
use crate::transport::Transport;

const BOOT_DRAIN_MS: u64 = 500;
const FINAL_DRAIN_MS: u64 = 1000;
const MAT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const PRESSURE_WAIT: Duration = Duration::from_secs(15);

/// Observed device state gathered during boot, assembled from the typed
/// replies the command layer returns.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub cartridge_loaded: bool,
    pub mat_loaded: bool,
    pub firmware_model: u16,
    pub firmware_major: u16,
    pub firmware_minor: u16,
    pub cartridge_present: bool,
    pub cartridge_name: String,
    pub cartridge_version: u8,
    pub x_min: u16,
    pub y_min: u16,
    pub x_max: u16,
    pub y_max: u16,
}

/// Hooks for the session's operator-facing prompts, so tests can run the
/// boot sequence without blocking on real `sleep`s or terminal output.
pub trait Operator {
    fn prompt_insert_mat(&mut self);
    fn prompt_pressure_wait(&mut self);
    fn sleep(&mut self, d: Duration);
}

/// Real operator: prints to stdout and actually sleeps.
pub struct ConsoleOperator;

impl Operator for ConsoleOperator {
    fn prompt_insert_mat(&mut self) {
        println!("\nMat not loaded, insert and press 'Load mat' key:");
    }

    fn prompt_pressure_wait(&mut self) {
        println!("\nSet pressure via bottom wheel...");
    }

    fn sleep(&mut self, d: Duration) {
        thread::sleep(d);
    }
}

pub struct SessionConfig {
    pub eject: bool,
    pub quick: bool,
    pub intercommand_ms: u64,
    pub intercurve_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            eject: true,
            quick: false,
            intercommand_ms: crate::compiler::DEFAULT_INTERCOMMAND_MS,
            intercurve_ms: crate::compiler::DEFAULT_INTERCURVE_MS,
        }
    }
}

/// Run the full boot → cut → eject → close sequence. `document` is
/// `None` when SVG ingest failed or no path was given — the boot
/// sequence still runs (status/version/etc.), just without cutting.
pub fn run<T: Transport, O: Operator>(
    transport: &mut T,
    layer: &mut CommandLayer,
    operator: &mut O,
    config: &SessionConfig,
    document: Option<&Document>,
) -> Result<DeviceState> {
    layer.extra_drain(transport, BOOT_DRAIN_MS)?;

    let mut state = DeviceState::default();

    apply_status(layer.send(transport, Command::Status)?, &mut state);
    info!(
        "mat is {}loaded, cartridge {}present",
        if state.mat_loaded { "" } else { "not " },
        if state.cartridge_loaded { "" } else { "not " }
    );

    apply_firmware(layer.send(transport, Command::FirmwareVersion)?, &mut state);
    info!(
        "model #{}, firmware ver {}.{}",
        state.firmware_model, state.firmware_major, state.firmware_minor
    );

    apply_cartridge(layer.send(transport, Command::CartridgeInfo)?, &mut state);

    let was_loaded = state.mat_loaded;
    while !state.mat_loaded {
        apply_status(layer.send(transport, Command::Status)?, &mut state);
        if state.mat_loaded {
            break;
        }
        operator.prompt_insert_mat();
        operator.sleep(MAT_POLL_INTERVAL);
    }

    apply_bounds(layer.send(transport, Command::MatBoundaries)?, &mut state);
    info!(
        "mat boundaries: ({},{}) to ({},{})",
        state.x_min, state.y_min, state.x_max, state.y_max
    );

    if !was_loaded && !config.quick {
        operator.prompt_pressure_wait();
        operator.sleep(PRESSURE_WAIT);
    }

    if let Some(document) = document {
        if !document.draw_sets.is_empty() {
            let mut compiler = CutCompiler::new();
            compiler.set_intercommand_ms(config.intercommand_ms);
            compiler.set_intercurve_ms(config.intercurve_ms);
            compiler.set_scaling(
                state.x_min,
                state.y_min,
                state.x_max.saturating_sub(state.x_min),
                state.y_max.saturating_sub(state.y_min),
                document.width,
                document.height,
            )?;
            let cut = compiler.cut_all(layer, transport, document)?;
            info!("cut {} draw sets", cut);
        }
    }

    if config.eject {
        info!("ejecting");
        layer.send(transport, Command::Move { sub_cmd: SubCmd::PenUp, x: 0, y: 0 })?;
    }

    layer.extra_drain(transport, FINAL_DRAIN_MS)?;

    Ok(state)
}

fn apply_status(reply: Reply, state: &mut DeviceState) {
    if let Reply::Status { cartridge_loaded, mat_loaded } = reply {
        state.cartridge_loaded = cartridge_loaded;
        state.mat_loaded = mat_loaded;
    }
}

fn apply_firmware(reply: Reply, state: &mut DeviceState) {
    if let Reply::FirmwareVersion { model, major, minor } = reply {
        state.firmware_model = model;
        state.firmware_major = major;
        state.firmware_minor = minor;
    }
}

fn apply_cartridge(reply: Reply, state: &mut DeviceState) {
    if let Reply::CartridgeInfo { present, name, version } = reply {
        state.cartridge_present = present;
        state.cartridge_name = name;
        state.cartridge_version = version;
    }
}

fn apply_bounds(reply: Reply, state: &mut DeviceState) {
    if let Reply::MatBoundaries { x_min, y_min, x_max, y_max } = reply {
        state.x_min = x_min;
        state.y_min = y_min;
        state.x_max = x_max;
        state.y_max = y_max;
    }
}
