//! Command frame encoding.
//!
//! Frame format written to the remote control characteristic, one frame per
//! write:
//! - Byte 0: command kind (0x00 = STOP, 0x01 = DRIVE)
//! - STOP payload: 1 byte per channel (channel id)
//! - DRIVE payload: 3 bytes per channel (channel id, direction, power)

use bytes::Bytes;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::command::{Channel, Command, CommandKind, Direction};

/// Encoded bytes of one command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame(Bytes);

impl Frame {
    /// Validate a raw buffer and wrap it as a frame.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        let data: Bytes = data.into();

        let (&kind_byte, payload) = data.split_first().ok_or_else(|| Error::InvalidFrame {
            context: "empty buffer".to_string(),
        })?;

        let kind = CommandKind::from_raw(kind_byte).ok_or_else(|| Error::InvalidFrame {
            context: format!("unknown command kind {:#04x}", kind_byte),
        })?;

        let width = kind.channel_width();
        if payload.is_empty() || payload.len() % width != 0 {
            return Err(Error::InvalidFrame {
                context: format!(
                    "{:?} payload of {} bytes is not a multiple of {}",
                    kind,
                    payload.len(),
                    width
                ),
            });
        }

        let mut seen = [false; 4];
        for part in payload.chunks(width) {
            let channel = Channel::from_raw(part[0]).ok_or_else(|| Error::InvalidFrame {
                context: format!("unknown channel {:#04x}", part[0]),
            })?;

            let slot = &mut seen[channel.to_raw() as usize];
            if *slot {
                return Err(Error::InvalidFrame {
                    context: format!("channel {} appears twice", channel),
                });
            }
            *slot = true;

            if kind == CommandKind::Drive && Direction::from_raw(part[1]).is_none() {
                return Err(Error::InvalidFrame {
                    context: format!("unknown direction {:#04x}", part[1]),
                });
            }
        }

        Ok(Self(data))
    }

    /// The command kind in byte 0.
    pub fn kind(&self) -> CommandKind {
        // Byte 0 is validated on every construction path.
        CommandKind::from_raw(self.0[0]).unwrap_or(CommandKind::Stop)
    }

    /// Number of channels carried by this frame.
    pub fn channel_count(&self) -> usize {
        (self.0.len() - 1) / self.kind().channel_width()
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a frame carries at least the kind byte.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the frame and return the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Encode a command into its wire frame.
///
/// # Errors
///
/// Returns [`Error::EmptyCommand`] if no channel was set and
/// [`Error::InvalidFrame`] if an instruction does not match the command kind
/// or a channel is addressed twice.
pub fn encode(command: &Command) -> Result<Frame> {
    if command.is_empty() {
        return Err(Error::EmptyCommand);
    }
    command.validate()?;

    let kind = command.kind();
    let mut out = Vec::with_capacity(1 + command.len() * kind.channel_width());
    out.push(kind.to_raw());
    for instruction in command.instructions() {
        instruction.write_to(&mut out);
    }

    let frame = Frame(Bytes::from(out));
    trace!("Encoded {:?} command: {}", kind, frame);

    Ok(frame)
}
