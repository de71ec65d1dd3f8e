#![allow(dead_code)]

mod harness;
mod http_client;
mod upstream;

pub use harness::*;
pub use http_client::*;
pub use upstream::*;
