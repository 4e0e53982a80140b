pub mod electrical;
pub mod energy;
pub mod power;
pub mod rate;
