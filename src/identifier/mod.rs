//! Equipment identifier normalization
//!
//! Serial numbers may contain characters that do not survive a URL path
//! (`#`, `/`, spaces). The codec maps a serial to a URL-safe token and back;
//! the locator resolves whatever identifier a caller sends (raw serial, token,
//! percent-encoded serial or a token from the old lossy encoder) to exactly
//! one canonical record.

pub mod codec;
pub mod locator;

pub use codec::{candidates, decode, encode, links};
pub use locator::{find, locate, Located, MatchStrategy};
