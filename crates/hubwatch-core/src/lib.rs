//! # hubwatch-core
//!
//! Value model and decoding engine shared by every Hubwatch crate.
//!
//! Records delivered by the message log are nested, dynamically shaped
//! structures whose union-typed fields are encoded as single-key
//! `{"<type>": payload}` mappings. The pieces here turn such a record
//! into plain values and check it against a watch-list:
//!
//! ```text
//! Walker::walk(record, watch_list)
//!     │  per field
//!     ├── decoder::decode        (tagged union / raw bytes → native value)
//!     │      └── WatchList::reduce   (consume matched value + field name)
//!     └── recurse into non-empty mappings and sequences
//! ```

pub mod decoder;
pub mod error;
pub mod event;
pub mod value;
pub mod walker;
pub mod watchlist;

pub use decoder::{decode, parse_text, DecodedLeaf, ParsedText, TypeTag};
pub use error::{CheckpointError, ConsumerError, DecodeError};
pub use event::ReceivedEvent;
pub use value::{Fields, RecordValue};
pub use walker::{walk, Walked, Walker, DEFAULT_MAX_DEPTH};
pub use watchlist::WatchList;
