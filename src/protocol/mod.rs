//! Protocol module for building and encoding SBrick commands.
//!
//! This module contains the implementations for:
//! - Channel, direction and command types
//! - Command frame encoding

pub mod command;
pub mod frame;

pub use command::{
    Channel, ChannelInstruction, Command, CommandKind, Direction, DriveBuilder, StopBuilder,
};
pub use frame::{encode, Frame};
