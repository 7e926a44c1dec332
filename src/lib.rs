#[macro_use]
extern crate mem_macros;

pub mod config;
pub mod device;
pub mod tpm2;
