//! Test utilities for qa-run.
//!
//! This module provides a scripted stand-in for a child process so the
//! interaction loop can be exercised deterministically, without spawning
//! anything or depending on scheduler timing.

mod scripted;

pub use scripted::{ScriptHandle, ScriptedProcess};
