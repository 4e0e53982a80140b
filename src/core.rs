pub mod battery;
pub mod clock;
pub mod config;
pub mod prices;
pub mod simulator;
pub mod solver;
pub mod tariff;
pub mod timeline;
pub mod working_mode;
