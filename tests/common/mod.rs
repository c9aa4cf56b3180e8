//! Shared test infrastructure: an in-process UDP agent and MIB fixtures.

// Not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod agent;
pub mod fixtures;

pub use agent::{ENGINE_BOOTS, ENGINE_ID, TestAgent, TestAgentBuilder};
pub use fixtures::{combined, device, device_with, interface_table, nonexistent_oid, system_mib};
