//! Pull transport: fetch the device info served by an agent on `GET {url}/info`.
#![forbid(unsafe_code)]

mod source;


pub use source::*;
