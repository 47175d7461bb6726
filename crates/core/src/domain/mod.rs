pub mod delivery;
pub mod reaction;
pub mod rule;
