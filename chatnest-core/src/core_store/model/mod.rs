/*
    Model subsystem - Value types shared across the chat subsystem
*/

pub mod types;

pub use types::*;
