//! Product model for the DXP digital spectrometer family.
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the products: register addresses, CSR bit layouts, FPGA
//! configuration targets, DSP memory geometry, special-run code tables and
//! timing contracts for every supported module variant.
//!
//! The driver crate consumes these profiles through one generic engine;
//! nothing outside the per-variant consts in this crate knows one product
//! from another.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`profile`] | `ChipProfile` and the types it is built from |
//! | [`tasks`] | Product-independent control-task identifiers |
//! | [`saturn`] | Saturn / X10P: 1 channel, 16-bit, EPP/USB bridge |
//! | [`mercury`] | Mercury: 4 channels, USB2 bridge |
//! | [`stj`] | STJ: 8 channels, PCI/PLX bridge, persistent writes |
//! | [`xmap`] | xMAP: 4 channels, PCI/PLX bridge, per-chunk readdress |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod mercury;
pub mod profile;
pub mod saturn;
pub mod stj;
pub mod tasks;
pub mod xmap;

pub use profile::{ChipProfile, ChipVariant};
pub use tasks::ControlTask;

/// Profile for a variant.
#[must_use]
pub const fn profile_for(variant: ChipVariant) -> &'static ChipProfile {
    match variant {
        ChipVariant::Saturn => &saturn::PROFILE,
        ChipVariant::Mercury => &mercury::PROFILE,
        ChipVariant::Stj => &stj::PROFILE,
        ChipVariant::Xmap => &xmap::PROFILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_self_consistent() {
        for variant in [
            ChipVariant::Saturn,
            ChipVariant::Mercury,
            ChipVariant::Stj,
            ChipVariant::Xmap,
        ] {
            let p = profile_for(variant);
            assert_eq!(p.variant, variant);
            assert!(p.channels >= 1);
            assert!(!p.fpga_targets.is_empty());
            assert_ne!(p.addr_port, p.data_port);
            for t in p.fpga_targets {
                assert_ne!(t.mask, 0);
                assert_eq!(t.init & t.xdone, 0, "{} INIT*/XDONE overlap", t.name);
            }
        }
    }
}
