//! The eight-command request/response vocabulary, framed as a tagged
//! `Command` enum and a single `CommandLayer::send` entry point.

use log::{debug, trace};

use crate::endian::{u16_be_read, u16_be_write, u32_le_write};
use crate::error::{Error, Result};
use crate::noise::NoiseGenerator;
use crate::transport::Transport;
use crate::xxtea;

const CMD_START_TRANSACTION: u8 = 0x21;
const CMD_END_TRANSACTION: u8 = 0x22;
const CMD_MAT_BOUNDARIES: u8 = 0x11;
const CMD_FIRMWARE_VERSION: u8 = 0x12;
const CMD_STATUS: u8 = 0x14;
const CMD_CARTRIDGE_INFO: u8 = 0x18;
const CMD_MOVE_CUT: u8 = 0x40;

const MAX_REPLY_LEN: usize = 255;

/// Mandatory quiet period enforced after every reply read, success or
/// failure — the device needs this long to be ready for the next
/// command.
pub const POST_REPLY_DRAIN_MS: u64 = 250;

/// Motion kind encoded by a 0x40 command's subCmd, which also selects
/// the XXTEA key index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCmd {
    /// Straight cut to (x, y) from the current position (SVG `L`).
    Line = 0,
    /// One control/endpoint word of a Bézier curve.
    Curve = 1,
    /// Pen-up move to (x, y) (SVG `M`, and the eject-to-origin move).
    PenUp = 2,
}

impl SubCmd {
    fn key_index(self) -> usize {
        self as usize
    }
}

/// The eight supported commands, tagged by variant rather than by a raw
/// command byte plus varargs.
#[derive(Debug, Clone, Copy)]
pub enum Command {
    StartTransaction,
    EndTransaction,
    Status,
    FirmwareVersion,
    MatBoundaries,
    CartridgeInfo,
    Move { sub_cmd: SubCmd, x: u16, y: u16 },
}

/// Typed reply payloads returned from `CommandLayer::send`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No reply expected or received (Start/End transaction).
    None,
    Status {
        cartridge_loaded: bool,
        mat_loaded: bool,
    },
    FirmwareVersion {
        model: u16,
        major: u16,
        minor: u16,
    },
    MatBoundaries {
        x_min: u16,
        y_min: u16,
        x_max: u16,
        y_max: u16,
    },
    CartridgeInfo {
        present: bool,
        name: String,
        version: u8,
    },
    MoveAck,
}

/// Per-connection transaction state. Only ever observed within one
/// `CommandLayer::send` call — nothing outlives it — but kept explicit
/// so invalid reentrancy is a compile-time impossibility rather than a
/// runtime assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transaction {
    Idle,
    AwaitReply(u8),
    Failed(u8),
}

/// Frames commands, tracks the at-most-one-outstanding reply, and parses
/// replies into typed `Reply` values.
pub struct CommandLayer {
    state: Transaction,
    noise: NoiseGenerator,
}

impl CommandLayer {
    pub fn new(noise: NoiseGenerator) -> Self {
        CommandLayer {
            state: Transaction::Idle,
            noise,
        }
    }

    /// Send `cmd`, read its reply if one is expected, and unconditionally
    /// drain for `POST_REPLY_DRAIN_MS` afterward.
    pub fn send<T: Transport>(&mut self, transport: &mut T, cmd: Command) -> Result<Reply> {
        let frame = self.build_frame(cmd)?;
        let cmd_byte = frame[1];

        self.state = Transaction::AwaitReply(cmd_byte);
        let sent = transport.send(&frame)?;
        if sent < frame.len() {
            debug!("frame for cmd {:#04x} short-sent: {}/{}", cmd_byte, sent, frame.len());
        }

        let result = if expects_reply(cmd_byte) {
            self.read_reply(transport, cmd_byte)
        } else {
            self.state = Transaction::Idle;
            Ok(Reply::None)
        };

        // Unconditional quiet period, success or failure.
        transport.drain(POST_REPLY_DRAIN_MS)?;

        result
    }

    /// Extra drain beyond the mandatory post-reply one, used by the cut
    /// compiler for its `intercommand`/`intercurve` pacing.
    pub fn extra_drain<T: Transport>(&mut self, transport: &mut T, ms: u64) -> Result<()> {
        transport.drain(ms)?;
        Ok(())
    }

    fn build_frame(&mut self, cmd: Command) -> Result<Vec<u8>> {
        match cmd {
            Command::StartTransaction => Ok(simple_frame(CMD_START_TRANSACTION)),
            Command::EndTransaction => Ok(simple_frame(CMD_END_TRANSACTION)),
            Command::Status => Ok(simple_frame(CMD_STATUS)),
            Command::FirmwareVersion => Ok(simple_frame(CMD_FIRMWARE_VERSION)),
            Command::MatBoundaries => Ok(simple_frame(CMD_MAT_BOUNDARIES)),
            Command::CartridgeInfo => Ok(simple_frame(CMD_CARTRIDGE_INFO)),
            Command::Move { sub_cmd, x, y } => {
                let noise = self.noise.next()?;
                let mut payload = [0u8; 12];
                u32_le_write(noise, &mut payload[0..4]);
                u32_le_write(x as u32, &mut payload[4..8]);
                u32_le_write(y as u32, &mut payload[8..12]);

                // payload is 3 u32 words; XXTEA operates on the word array.
                let mut words = [
                    u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
                    u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]),
                ];
                let key = &xxtea::COMMAND_KEYS[sub_cmd.key_index()];
                xxtea::encrypt(&mut words, key);
                for (i, w) in words.iter().enumerate() {
                    payload[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
                }

                trace!("move sub_cmd={:?} x={} y={} noise={}", sub_cmd, x, y, noise);

                let mut frame = vec![13, CMD_MOVE_CUT];
                frame.extend_from_slice(&payload);
                Ok(frame)
            }
        }
    }

    fn read_reply<T: Transport>(&mut self, transport: &mut T, cmd_byte: u8) -> Result<Reply> {
        let mut len_buf = [0u8; 1];
        let n = transport.read(&mut len_buf)?;
        if n < 1 {
            self.state = Transaction::Failed(cmd_byte);
            return Err(Error::ReplyIO(format!(
                "no length byte for cmd {:#04x}",
                cmd_byte
            )));
        }

        let reply_len = len_buf[0] as usize;
        if reply_len > MAX_REPLY_LEN {
            self.state = Transaction::Failed(cmd_byte);
            return Err(Error::ProtocolRange(format!(
                "reply length {} exceeds {}-byte buffer for cmd {:#04x}",
                reply_len, MAX_REPLY_LEN, cmd_byte
            )));
        }

        let mut buf = vec![0u8; reply_len];
        let n = transport.read(&mut buf)?;
        if n < reply_len {
            self.state = Transaction::Failed(cmd_byte);
            return Err(Error::ReplyIO(format!(
                "expected {} reply bytes for cmd {:#04x}, got {}",
                reply_len, cmd_byte, n
            )));
        }

        self.state = Transaction::Idle;
        parse_reply(cmd_byte, &buf)
    }
}

fn expects_reply(cmd_byte: u8) -> bool {
    !matches!(cmd_byte, CMD_START_TRANSACTION | CMD_END_TRANSACTION)
}

fn simple_frame(cmd: u8) -> Vec<u8> {
    // length counts cmd + zero-padded payload: 4 bytes (cmd + 3 zero
    // bytes), total frame on the wire is 5 bytes.
    vec![4, cmd, 0, 0, 0]
}

fn parse_reply(cmd_byte: u8, buf: &[u8]) -> Result<Reply> {
    match cmd_byte {
        CMD_STATUS => {
            if buf.len() < 4 {
                return Err(Error::ReplyIO("short status reply".into()));
            }
            Ok(Reply::Status {
                cartridge_loaded: u16_be_read(&buf[0..2]) != 0,
                mat_loaded: u16_be_read(&buf[2..4]) != 0,
            })
        }
        CMD_FIRMWARE_VERSION => {
            if buf.len() < 6 {
                return Err(Error::ReplyIO("short firmware reply".into()));
            }
            Ok(Reply::FirmwareVersion {
                model: u16_be_read(&buf[0..2]),
                major: u16_be_read(&buf[2..4]),
                minor: u16_be_read(&buf[4..6]),
            })
        }
        CMD_MAT_BOUNDARIES => {
            if buf.len() < 8 {
                return Err(Error::ReplyIO("short mat-boundaries reply".into()));
            }
            Ok(Reply::MatBoundaries {
                x_min: u16_be_read(&buf[0..2]),
                y_min: u16_be_read(&buf[2..4]),
                x_max: u16_be_read(&buf[4..6]),
                y_max: u16_be_read(&buf[6..8]),
            })
        }
        CMD_CARTRIDGE_INFO => {
            if buf.len() < 4 {
                return Err(Error::ReplyIO("short cartridge-info reply".into()));
            }
            let present = u16_be_read(&buf[0..2]) != 0;
            let name_len = u16_be_read(&buf[2..4]) as usize;
            if 4 + name_len >= buf.len() {
                return Err(Error::ProtocolRange(format!(
                    "cartridge name length {} overruns reply of {} bytes",
                    name_len,
                    buf.len()
                )));
            }
            let name_bytes = &buf[4..4 + name_len];
            let nul_at = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
            let name = String::from_utf8_lossy(&name_bytes[..nul_at]).into_owned();
            let version = buf[4 + name_len];
            Ok(Reply::CartridgeInfo {
                present,
                name,
                version,
            })
        }
        CMD_MOVE_CUT => {
            if buf.len() < 4 {
                return Err(Error::ReplyIO("short move/cut reply".into()));
            }
            Ok(Reply::MoveAck)
        }
        other => Err(Error::ProtocolRange(format!("unexpected reply for cmd {:#04x}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn layer_fixed(start: u32) -> CommandLayer {
        CommandLayer::new(NoiseGenerator::fixed(start))
    }

    #[test]
    fn frame_shape_simple_commands() {
        let frame = simple_frame(CMD_STATUS);
        assert_eq!(frame[0] as usize, frame.len() - 1);
        assert_eq!(frame.len(), 5);
    }

    #[test]
    fn frame_shape_move_command() {
        let mut layer = layer_fixed(10001);
        let frame = layer
            .build_frame(Command::Move {
                sub_cmd: SubCmd::Line,
                x: 0,
                y: 0,
            })
            .unwrap();
        assert_eq!(frame[0] as usize, frame.len() - 1);
        assert_eq!(frame.len(), 14);
        assert_eq!(frame[0], 13);
        assert_eq!(frame[1], CMD_MOVE_CUT);
    }

    #[test]
    fn invalid_subcmd_is_unreachable_via_enum() {
        // SubCmd is a closed enum of exactly {Line, Curve, PenUp}; there
        // is no way to construct an invalid subCmd value.
        assert_eq!(SubCmd::Line.key_index(), 0);
        assert_eq!(SubCmd::Curve.key_index(), 1);
        assert_eq!(SubCmd::PenUp.key_index(), 2);
    }

    #[test]
    fn boot_sequence_status_firmware_cartridge() {
        let mut t = MockTransport::new();
        t.queue_reply(&[0x04, 0x00, 0x01, 0x00, 0x00]); // status: cartridge loaded, mat not
        t.queue_reply(&[0x06, 0x00, 0x14, 0x00, 0x02, 0x00, 0x22]); // model 20 fw 2.34
        let mut name = vec![0x26, 0x00, 0x01, 0x00, 0x21];
        name.extend_from_slice(b"Cricut(R) Cake Basics");
        name.extend(std::iter::repeat(0u8).take(33 - "Cricut(R) Cake Basics".len()));
        name.push(0x23);
        t.queue_reply(&name);

        let mut layer = layer_fixed(10001);

        let status = layer.send(&mut t, Command::Status).unwrap();
        assert_eq!(
            status,
            Reply::Status {
                cartridge_loaded: true,
                mat_loaded: false
            }
        );

        let version = layer.send(&mut t, Command::FirmwareVersion).unwrap();
        assert_eq!(
            version,
            Reply::FirmwareVersion {
                model: 20,
                major: 2,
                minor: 34
            }
        );

        let cart = layer.send(&mut t, Command::CartridgeInfo).unwrap();
        match cart {
            Reply::CartridgeInfo { present, name, version } => {
                assert!(present);
                assert_eq!(name, "Cricut(R) Cake Basics");
                assert_eq!(version, 0x23);
            }
            _ => panic!("unexpected reply {:?}", cart),
        }

        assert_eq!(t.sent_frames[0], vec![0x04, 0x14, 0x00, 0x00, 0x00]);
        assert_eq!(t.sent_frames[1], vec![0x04, 0x12, 0x00, 0x00, 0x00]);
        assert_eq!(t.sent_frames[2], vec![0x04, 0x18, 0x00, 0x00, 0x00]);

        assert_eq!(t.drains, vec![POST_REPLY_DRAIN_MS; 3]);
    }

    #[test]
    fn mat_boundaries_reply_fields() {
        let mut t = MockTransport::new();
        t.queue_reply(&[0x08, 0x01, 0x3C, 0x00, 0x32, 0x13, 0x62, 0x12, 0x58]);
        let mut layer = layer_fixed(10001);
        let reply = layer.send(&mut t, Command::MatBoundaries).unwrap();
        assert_eq!(
            reply,
            Reply::MatBoundaries {
                x_min: 316,
                y_min: 50,
                x_max: 4962,
                y_max: 4696,
            }
        );
    }

    #[test]
    fn noise_value_lands_in_wire_bytes() {
        let mut layer = layer_fixed(10001);
        let frame = layer
            .build_frame(Command::Move {
                sub_cmd: SubCmd::Line,
                x: 100,
                y: 200,
            })
            .unwrap();
        let mut words = [
            u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]),
            u32::from_le_bytes([frame[6], frame[7], frame[8], frame[9]]),
            u32::from_le_bytes([frame[10], frame[11], frame[12], frame[13]]),
        ];
        xxtea::decrypt(&mut words, &xxtea::COMMAND_KEYS[SubCmd::Line as usize]);
        assert_eq!(words[0], 10001);
        assert_eq!(words[1], 100);
        assert_eq!(words[2], 200);
    }

    #[test]
    fn short_reply_is_reply_io_error() {
        let mut t = MockTransport::new();
        t.queue_reply(&[0x08, 0x01, 0x3C]); // promises 8 bytes, delivers 2
        let mut layer = layer_fixed(10001);
        let err = layer.send(&mut t, Command::MatBoundaries).unwrap_err();
        assert!(matches!(err, Error::ReplyIO(_)));
    }
}
