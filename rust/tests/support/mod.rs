#![allow(dead_code)]

mod helpers;
mod scripted_api;

pub use helpers::*;
pub use scripted_api::*;
