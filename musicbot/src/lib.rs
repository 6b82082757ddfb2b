//! Chat-driven jukebox daemon
//!
//! Five actors share one message bus: the chat front end, the player
//! controller, the download pipeline, the search index and the rating
//! engine. Each actor owns its state and talks to the others only
//! through bus envelopes.

pub mod actor;
pub mod download;
pub mod frontend;
pub mod player;
pub mod rating;
pub mod search;
pub mod tags;
