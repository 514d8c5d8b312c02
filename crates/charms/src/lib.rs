//! Spell model for charm transfers: tagged app records, input and output
//! charm maps, boundary validation, and transfer-spell composition.

pub mod error;
pub mod holdings;
pub mod spell;

pub use error::SpellError;
pub use holdings::{compose_transfer_spell, holdings_from_spell, CharmHolding};
pub use spell::{App, Spell, SpellInput, SpellOutput, UtxoId};
