//! DSP parameter symbol tables.
//!
//! A DSP exposes its tunable state as named 16-bit parameters in data
//! memory. Global parameters have one absolute address; per-channel
//! parameters have a relative address plus a per-channel base offset.

use std::collections::HashMap;

use crate::error::{FirmwareError, Result};

/// Host access mode of a DSP parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Host may read but not write.
    ReadOnly,
    /// Host may read and write.
    ReadWrite,
    /// Host may write but not read.
    WriteOnly,
}

/// One DSP parameter.
///
/// Bounds of `(0, 0)` mean unbounded; any other pair is an inclusive
/// clamp range applied on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    /// Address in data memory. Absolute for global parameters, relative
    /// to the channel base offset for per-channel parameters.
    pub address: u32,
    /// Host access mode.
    pub access: AccessMode,
    /// Inclusive lower clamp bound.
    pub lower_bound: u16,
    /// Inclusive upper clamp bound.
    pub upper_bound: u16,
}

impl Parameter {
    /// An unbounded read-write parameter at `address`.
    #[must_use]
    pub const fn read_write(address: u32) -> Self {
        Self {
            address,
            access: AccessMode::ReadWrite,
            lower_bound: 0,
            upper_bound: 0,
        }
    }

    /// Whether this parameter declares a clamp range.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        !(self.lower_bound == 0 && self.upper_bound == 0)
    }
}

/// The symbol table of one DSP program.
///
/// Invariant: a name lives in exactly one of the two maps, and
/// `channel_offsets` has one entry per physical channel on the module.
#[derive(Debug, Clone, Default)]
pub struct DspParameterTable {
    global: HashMap<String, Parameter>,
    per_channel: HashMap<String, Parameter>,
    channel_offsets: Vec<u32>,
}

impl DspParameterTable {
    /// Builds a table, rejecting names present in both maps.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError::DuplicateSymbol`] for the first name
    /// found in both the global and the per-channel map.
    pub fn new(
        global: HashMap<String, Parameter>,
        per_channel: HashMap<String, Parameter>,
        channel_offsets: Vec<u32>,
    ) -> Result<Self> {
        if let Some(name) = global.keys().find(|n| per_channel.contains_key(*n)) {
            return Err(FirmwareError::DuplicateSymbol { name: name.clone() });
        }

        Ok(Self {
            global,
            per_channel,
            channel_offsets,
        })
    }

    /// Whether `name` is a global parameter.
    #[must_use]
    pub fn is_global(&self, name: &str) -> bool {
        self.global.contains_key(name)
    }

    /// Whether `name` exists in either map.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.global.contains_key(name) || self.per_channel.contains_key(name)
    }

    /// Global parameter by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Parameter> {
        self.global.get(name)
    }

    /// Per-channel parameter by name.
    #[must_use]
    pub fn per_channel(&self, name: &str) -> Option<&Parameter> {
        self.per_channel.get(name)
    }

    /// Parameter by name, wherever it lives.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.global.get(name).or_else(|| self.per_channel.get(name))
    }

    /// Data-memory base offsets, one per physical channel.
    #[must_use]
    pub fn channel_offsets(&self) -> &[u32] {
        &self.channel_offsets
    }

    /// Number of global parameters.
    #[must_use]
    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    /// Number of per-channel parameters.
    #[must_use]
    pub fn per_channel_count(&self) -> usize {
        self.per_channel.len()
    }

    /// Iterates global parameters in arbitrary order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.global.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Iterates per-channel parameters in arbitrary order.
    pub fn per_channels(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.per_channel.iter().map(|(n, p)| (n.as_str(), p))
    }
}
