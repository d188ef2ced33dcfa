//! DSP parameter addressing.
//!
//! Maps symbol names to data-memory addresses against one program's
//! parameter table. Global symbols have one address for the whole
//! module; per-channel symbols add the channel's base offset. Wide
//! values split across `NAME0`/`NAME1`/`NAME2` word pieces are resolved
//! as a group when the bare name is absent.
//!
//! Addresses produced here are offsets within DSP data memory. Callers
//! add the product's data-memory window base when forming bus addresses.

use dxp_firmware::{AccessMode, DspParameterTable, Parameter};
use tracing::warn;

use crate::error::{DxpError, Result};

/// Outcome of a parameter write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The requested value was written as-is.
    Written,
    /// The value fell outside the symbol's declared bounds and the
    /// nearest bound was written instead.
    Clamped {
        /// Value the caller asked for.
        requested: u16,
        /// Value actually written.
        written: u16,
    },
}

/// Addresses backing one logical read, lowest-order piece first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    /// Data-memory addresses to fetch, in combining order.
    pub addresses: Vec<u32>,
    /// Declared access mode of the symbol.
    pub access: AccessMode,
}

/// A checked single-word write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    /// Data-memory address to store to.
    pub address: u32,
    /// Value to store, after any clamping.
    pub value: u16,
    /// Whether the requested value survived intact.
    pub outcome: WriteOutcome,
}

/// Name-to-address resolution against one parameter table.
#[derive(Debug, Clone, Copy)]
pub struct SymbolResolver<'a> {
    table: &'a DspParameterTable,
}

impl<'a> SymbolResolver<'a> {
    /// Create a resolver over one program's exports.
    #[must_use]
    pub fn new(table: &'a DspParameterTable) -> Self {
        Self { table }
    }

    /// Whether `name` is module-global rather than per-channel.
    #[must_use]
    pub fn is_global(&self, name: &str) -> bool {
        self.table.is_global(name)
    }

    /// Look up `name` in the table.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::UnknownSymbol`] when the program does not
    /// export `name`.
    pub fn parameter(&self, name: &str) -> Result<&'a Parameter> {
        self.table
            .parameter(name)
            .ok_or_else(|| DxpError::unknown_symbol(name))
    }

    /// Data-memory address of `name` for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::UnknownSymbol`] for an unexported name and
    /// [`DxpError::InvalidChannel`] when a per-channel symbol is asked
    /// for a channel the table has no base offset for.
    pub fn resolve(&self, name: &str, channel: usize) -> Result<u32> {
        let param = self.parameter(name)?;
        if self.table.is_global(name) {
            return Ok(param.address);
        }
        let offsets = self.table.channel_offsets();
        let Some(base) = offsets.get(channel) else {
            return Err(DxpError::InvalidChannel { channel, channels: offsets.len() });
        };
        Ok(base + param.address)
    }

    /// Plan a read of `name`, probing `NAME0`/`NAME1`/`NAME2` word
    /// pieces when the bare name is absent.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::UnknownSymbol`] when neither the bare name
    /// nor a piece pair exists, [`DxpError::WriteOnlyAccess`] for a
    /// write-only symbol, and channel errors as in [`Self::resolve`].
    pub fn read_plan(&self, name: &str, channel: usize) -> Result<ReadPlan> {
        let pieces = self.piece_names(name);
        let mut addresses = Vec::with_capacity(pieces.len());
        let mut access = AccessMode::ReadWrite;
        for (index, piece) in pieces.iter().enumerate() {
            if index == 0 {
                access = self.parameter(piece)?.access;
            }
            addresses.push(self.resolve(piece, channel)?);
        }
        if access == AccessMode::WriteOnly {
            return Err(DxpError::WriteOnlyAccess { name: name.to_owned() });
        }
        Ok(ReadPlan { addresses, access })
    }

    /// Plan a write of `value` to `name`, clamping into the symbol's
    /// declared bounds.
    ///
    /// # Errors
    ///
    /// Returns [`DxpError::ReadOnlyAccess`] for a read-only symbol, and
    /// name or channel errors as in [`Self::resolve`].
    pub fn write_plan(&self, name: &str, channel: usize, value: u16) -> Result<WritePlan> {
        let param = self.parameter(name)?;
        if param.access == AccessMode::ReadOnly {
            return Err(DxpError::ReadOnlyAccess { name: name.to_owned() });
        }
        let address = self.resolve(name, channel)?;
        let outcome = if param.is_bounded()
            && (value < param.lower_bound || value > param.upper_bound)
        {
            let written = value.clamp(param.lower_bound, param.upper_bound);
            warn!(
                symbol = name,
                requested = value,
                written,
                lower = param.lower_bound,
                upper = param.upper_bound,
                "value outside symbol bounds, clamping"
            );
            WriteOutcome::Clamped { requested: value, written }
        } else {
            WriteOutcome::Written
        };
        let value = match outcome {
            WriteOutcome::Written => value,
            WriteOutcome::Clamped { written, .. } => written,
        };
        Ok(WritePlan { address, value, outcome })
    }

    fn piece_names(&self, name: &str) -> Vec<String> {
        if self.table.contains(name) {
            return vec![name.to_owned()];
        }
        let lo = format!("{name}0");
        let mid = format!("{name}1");
        if self.table.contains(&lo) && self.table.contains(&mid) {
            let mut pieces = vec![lo, mid];
            let hi = format!("{name}2");
            if self.table.contains(&hi) {
                pieces.push(hi);
            }
            return pieces;
        }
        // let resolve() report the bare name
        vec![name.to_owned()]
    }
}

/// Combine word pieces into one value, lowest-order word first.
#[must_use]
pub fn combine_words(words: &[u16]) -> f64 {
    let mut total = 0.0;
    let mut scale = 1.0;
    for &word in words {
        total += f64::from(word) * scale;
        scale *= 65536.0;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table() -> DspParameterTable {
        let mut global = HashMap::new();
        global.insert("RUNTASKS".to_owned(), Parameter::read_write(0x10));
        global.insert(
            "REALTIME0".to_owned(),
            Parameter { address: 0x20, access: AccessMode::ReadOnly, lower_bound: 0, upper_bound: 0 },
        );
        global.insert(
            "REALTIME1".to_owned(),
            Parameter { address: 0x21, access: AccessMode::ReadOnly, lower_bound: 0, upper_bound: 0 },
        );
        global.insert(
            "REALTIME2".to_owned(),
            Parameter { address: 0x22, access: AccessMode::ReadOnly, lower_bound: 0, upper_bound: 0 },
        );
        let mut per_channel = HashMap::new();
        per_channel.insert("MCALIMLO".to_owned(), Parameter::read_write(0x4));
        per_channel.insert(
            "SLOWLEN".to_owned(),
            Parameter { address: 0x8, access: AccessMode::ReadWrite, lower_bound: 2, upper_bound: 28 },
        );
        DspParameterTable::new(global, per_channel, vec![0x0, 0x40]).unwrap()
    }

    #[test]
    fn per_channel_symbols_add_the_channel_base() {
        let table = table();
        let resolver = SymbolResolver::new(&table);
        assert_eq!(resolver.resolve("MCALIMLO", 0).unwrap(), 0x4);
        assert_eq!(resolver.resolve("MCALIMLO", 1).unwrap(), 0x44);
        assert_eq!(resolver.resolve("RUNTASKS", 1).unwrap(), 0x10);
    }

    #[test]
    fn channel_out_of_range() {
        let table = table();
        let resolver = SymbolResolver::new(&table);
        let err = resolver.resolve("MCALIMLO", 2).unwrap_err();
        assert!(matches!(err, DxpError::InvalidChannel { channel: 2, channels: 2 }));
    }

    #[test]
    fn unknown_name() {
        let table = table();
        let resolver = SymbolResolver::new(&table);
        assert!(matches!(
            resolver.resolve("NOSUCH", 0),
            Err(DxpError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn wide_symbols_resolve_as_pieces() {
        let table = table();
        let resolver = SymbolResolver::new(&table);
        let plan = resolver.read_plan("REALTIME", 0).unwrap();
        assert_eq!(plan.addresses, vec![0x20, 0x21, 0x22]);
    }

    #[test]
    fn combine_is_little_word_first() {
        assert_eq!(combine_words(&[0x0001]), 1.0);
        assert_eq!(combine_words(&[0x0, 0x1]), 65536.0);
        assert_eq!(combine_words(&[0x5, 0x3, 0x2]), 2.0 * 4_294_967_296.0 + 3.0 * 65536.0 + 5.0);
    }

    #[test]
    fn writes_clamp_into_bounds() {
        let table = table();
        let resolver = SymbolResolver::new(&table);
        let plan = resolver.write_plan("SLOWLEN", 0, 100).unwrap();
        assert_eq!(plan.value, 28);
        assert_eq!(plan.outcome, WriteOutcome::Clamped { requested: 100, written: 28 });
        let plan = resolver.write_plan("SLOWLEN", 0, 1).unwrap();
        assert_eq!(plan.value, 2);
        let plan = resolver.write_plan("SLOWLEN", 0, 10).unwrap();
        assert_eq!(plan.outcome, WriteOutcome::Written);
    }

    #[test]
    fn read_only_symbols_reject_writes() {
        let table = table();
        let resolver = SymbolResolver::new(&table);
        assert!(matches!(
            resolver.write_plan("REALTIME0", 0, 1),
            Err(DxpError::ReadOnlyAccess { .. })
        ));
    }
}
