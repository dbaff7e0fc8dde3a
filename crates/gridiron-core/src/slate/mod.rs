// Slate data: players, positions, variants, and CSV import.

pub mod import;
pub mod player;

pub use player::{Player, Position, Signals, Variant};
