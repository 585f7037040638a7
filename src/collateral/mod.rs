pub mod gold;

pub use gold::{CollateralSummary, GoldItem, NewGoldItem};
