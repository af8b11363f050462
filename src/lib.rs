extern crate chrono;
extern crate data_encoding;
#[macro_use]
extern crate diesel;
extern crate filetime;
#[macro_use]
extern crate log;
extern crate ring;

pub mod asset_cache;
pub mod indexer;
pub mod rcs;
pub mod resolver;
pub mod store;
pub mod tuid;
pub mod virtual_fs;
