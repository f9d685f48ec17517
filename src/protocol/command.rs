//! Logical SBrick commands.
//!
//! A [`Command`] is a set of per-channel instructions that all share one
//! [`CommandKind`]. Commands are plain values: the builders consume themselves
//! on every call and [`build`](DriveBuilder::build) hands back a finished
//! command, so two callers can never share a half-built one.
//!
//! Writing the same channel twice keeps the last instruction, at the position
//! where that channel was first written:
//!
//! ```
//! use sbrick_rust_ble::{Channel, Command, Direction};
//!
//! let command = Command::drive()
//!     .channel(Channel::B, Direction::Clockwise, 0x40)
//!     .channel(Channel::A, Direction::Clockwise, 0x80)
//!     .channel(Channel::B, Direction::CounterClockwise, 0xFF)
//!     .build();
//!
//! assert_eq!(command.channels(), vec![Channel::B, Channel::A]);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::frame::{encode, Frame};

/// One of the four SBrick output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Channel {
    /// Channel A (0x00).
    A = 0x00,
    /// Channel B (0x01).
    B = 0x01,
    /// Channel C (0x02).
    C = 0x02,
    /// Channel D (0x03).
    D = 0x03,
}

impl Channel {
    /// All channels in wire order.
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    /// Create from the wire id, if it names a channel.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::A),
            0x01 => Some(Self::B),
            0x02 => Some(Self::C),
            0x03 => Some(Self::D),
            _ => None,
        }
    }

    /// Convert to the wire id.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

/// Rotation direction for a drive instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Direction {
    /// Clockwise (0x00).
    #[default]
    Clockwise = 0x00,
    /// Counter-clockwise (0x01).
    CounterClockwise = 0x01,
}

impl Direction {
    /// Create from the wire value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Clockwise),
            0x01 => Some(Self::CounterClockwise),
            _ => None,
        }
    }

    /// Convert to the wire value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// The opposite direction.
    pub fn reversed(&self) -> Self {
        match self {
            Self::Clockwise => Self::CounterClockwise,
            Self::CounterClockwise => Self::Clockwise,
        }
    }
}

/// Command kind, the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum CommandKind {
    /// Stop the listed channels (0x00).
    Stop = 0x00,
    /// Drive the listed channels (0x01).
    Drive = 0x01,
}

impl CommandKind {
    /// Create from the wire value.
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Stop),
            0x01 => Some(Self::Drive),
            _ => None,
        }
    }

    /// Convert to the wire value.
    pub fn to_raw(&self) -> u8 {
        *self as u8
    }

    /// Number of payload bytes each channel takes in a frame of this kind.
    pub fn channel_width(&self) -> usize {
        match self {
            Self::Stop => 1,
            Self::Drive => 3,
        }
    }
}

/// A single channel's part of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChannelInstruction {
    /// Stop the channel.
    Stop(Channel),
    /// Drive the channel in a direction with a power level.
    Drive {
        /// Target channel.
        channel: Channel,
        /// Rotation direction.
        direction: Direction,
        /// Power magnitude, 0-255.
        power: u8,
    },
}

impl ChannelInstruction {
    /// The channel this instruction applies to.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Stop(channel) => *channel,
            Self::Drive { channel, .. } => *channel,
        }
    }

    /// The command kind this instruction belongs to.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Stop(_) => CommandKind::Stop,
            Self::Drive { .. } => CommandKind::Drive,
        }
    }

    /// Append the wire payload for this instruction.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Stop(channel) => out.push(channel.to_raw()),
            Self::Drive {
                channel,
                direction,
                power,
            } => out.extend_from_slice(&[channel.to_raw(), direction.to_raw(), *power]),
        }
    }
}

/// A complete command: one kind, at most one instruction per channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "CommandFields")
)]
pub struct Command {
    kind: CommandKind,
    instructions: Vec<ChannelInstruction>,
}

/// Serialized form of a [`Command`], checked before it becomes one.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct CommandFields {
    kind: CommandKind,
    instructions: Vec<ChannelInstruction>,
}

#[cfg(feature = "serde")]
impl TryFrom<CommandFields> for Command {
    type Error = Error;

    fn try_from(fields: CommandFields) -> Result<Self> {
        let mut command = Command::empty(fields.kind);
        for instruction in fields.instructions {
            command.check_kind(&instruction)?;
            command.upsert(instruction);
        }
        Ok(command)
    }
}

impl Command {
    /// Start building a STOP command.
    pub fn stop() -> StopBuilder {
        StopBuilder {
            command: Command::empty(CommandKind::Stop),
        }
    }

    /// Start building a DRIVE command.
    pub fn drive() -> DriveBuilder {
        DriveBuilder {
            command: Command::empty(CommandKind::Drive),
        }
    }

    /// STOP command for a set of channels.
    pub fn stop_channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        channels
            .into_iter()
            .fold(Command::stop(), |builder, channel| builder.channel(channel))
            .build()
    }

    /// DRIVE command from a channel to (direction, power) mapping.
    pub fn drive_channels(channels: impl IntoIterator<Item = (Channel, (Direction, u8))>) -> Self {
        channels
            .into_iter()
            .fold(Command::drive(), |builder, (channel, (direction, power))| {
                builder.channel(channel, direction, power)
            })
            .build()
    }

    /// STOP on every channel, the state a freshly connected device is put in.
    pub fn stop_all() -> Self {
        Command::stop().all_channels().build()
    }

    fn empty(kind: CommandKind) -> Self {
        Self {
            kind,
            instructions: Vec::with_capacity(Channel::ALL.len()),
        }
    }

    /// Insert or overwrite the instruction for its channel.
    fn upsert(&mut self, instruction: ChannelInstruction) {
        debug_assert_eq!(instruction.kind(), self.kind);

        match self
            .instructions
            .iter_mut()
            .find(|existing| existing.channel() == instruction.channel())
        {
            Some(existing) => *existing = instruction,
            None => self.instructions.push(instruction),
        }
    }

    fn check_kind(&self, instruction: &ChannelInstruction) -> Result<()> {
        if instruction.kind() != self.kind {
            return Err(Error::InvalidFrame {
                context: format!(
                    "{:?} instruction for channel {} in a {:?} command",
                    instruction.kind(),
                    instruction.channel(),
                    self.kind
                ),
            });
        }
        Ok(())
    }

    /// Check that every instruction matches the command kind and that no
    /// channel is addressed twice.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut seen = [false; 4];
        for instruction in &self.instructions {
            self.check_kind(instruction)?;

            let slot = &mut seen[instruction.channel().to_raw() as usize];
            if *slot {
                return Err(Error::InvalidFrame {
                    context: format!("channel {} appears twice", instruction.channel()),
                });
            }
            *slot = true;
        }
        Ok(())
    }

    /// The command kind.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Instructions in wire order.
    pub fn instructions(&self) -> &[ChannelInstruction] {
        &self.instructions
    }

    /// Channels addressed by this command, in wire order.
    pub fn channels(&self) -> Vec<Channel> {
        self.instructions.iter().map(|i| i.channel()).collect()
    }

    /// Number of channel instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check whether no channel has been set.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Encode this command into a frame.
    pub fn encode(&self) -> Result<Frame> {
        encode(self)
    }
}

/// Builder for STOP commands.
#[derive(Debug, Clone)]
#[must_use]
pub struct StopBuilder {
    command: Command,
}

impl StopBuilder {
    /// Stop a channel.
    pub fn channel(mut self, channel: Channel) -> Self {
        self.command.upsert(ChannelInstruction::Stop(channel));
        self
    }

    /// Stop every channel.
    pub fn all_channels(self) -> Self {
        Channel::ALL
            .into_iter()
            .fold(self, |builder, channel| builder.channel(channel))
    }

    /// Finish the command.
    pub fn build(self) -> Command {
        self.command
    }
}

/// Builder for DRIVE commands.
#[derive(Debug, Clone)]
#[must_use]
pub struct DriveBuilder {
    command: Command,
}

impl DriveBuilder {
    /// Drive a channel in `direction` with `power` (0-255).
    pub fn channel(mut self, channel: Channel, direction: Direction, power: u8) -> Self {
        self.command.upsert(ChannelInstruction::Drive {
            channel,
            direction,
            power,
        });
        self
    }

    /// Drive every channel with the same direction and power.
    pub fn all_channels(self, direction: Direction, power: u8) -> Self {
        Channel::ALL
            .into_iter()
            .fold(self, |builder, channel| builder.channel(channel, direction, power))
    }

    /// Finish the command.
    pub fn build(self) -> Command {
        self.command
    }
}
