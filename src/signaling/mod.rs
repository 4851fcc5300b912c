//! WHEP HTTP signaling.
//!
//! - `http`: transport abstraction plus the default hyper client
//! - `whep_client`: the four WHEP requests (OPTIONS, POST, PATCH, DELETE)

pub mod http;
pub mod whep_client;

pub use self::http::*;
pub use whep_client::*;
