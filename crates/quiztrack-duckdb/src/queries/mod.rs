pub mod campaigns;
pub mod events;
pub(crate) mod filter;
pub mod stats;
