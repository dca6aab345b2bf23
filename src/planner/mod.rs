//! Budget planning: bitrate, resolution tier, codec and GOP selection

pub mod budget;
pub mod gop;
pub mod ladder;

pub use budget::BudgetSolver;
pub use gop::GopPolicy;
pub use ladder::ResolutionLadder;
