//! Core protocol, geometry, and orchestration logic for driving a
//! die-cutting plotter over its serial command channel.

pub mod command;
pub mod compiler;
pub mod endian;
pub mod error;
pub mod noise;
pub mod path;
pub mod session;
pub mod svg;
pub mod transport;
pub mod xxtea;

pub use command::{Command, CommandLayer, Reply, SubCmd};
pub use compiler::CutCompiler;
pub use error::{Error, Result};
pub use noise::NoiseGenerator;
pub use path::{Document, DrawOp, DrawSet, Point};
pub use session::{ConsoleOperator, DeviceState, Operator, SessionConfig};
pub use transport::{SerialTransport, Transport};
