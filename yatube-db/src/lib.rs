pub mod client;
pub mod media;
mod record;
