pub mod campaigns;
pub mod diagnostics;
pub mod health;
pub mod monitor;
pub mod stats;
pub mod track;
