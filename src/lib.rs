//! # snmp-monitor
//!
//! SNMP device-communication core for network monitoring.
//!
//! ## Features
//!
//! - SNMPv1, v2c and v3 (USM authentication and privacy) over UDP or TCP
//! - Validation of devices, OIDs and bulk parameters before any network call
//! - TTL + LRU response cache keyed by device identity, never by secrets
//! - Device poller that reconciles probe and discovery results into stored
//!   device and interface records
//! - JSON HTTP boundary built on axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmp_monitor::{ClientConfig, SnmpClient, oid};
//! use snmp_monitor::device::{SnmpCredentials, SnmpDevice};
//!
//! #[tokio::main]
//! async fn main() -> snmp_monitor::Result<()> {
//!     let client = SnmpClient::new(ClientConfig::default());
//!     let device = SnmpDevice::new("192.168.1.1", SnmpCredentials::v2c("public"));
//!
//!     let status = client.test_connection(&device).await?;
//!     println!("reachable: {} ({} ms)", status.reachable, status.response_time_ms);
//!
//!     let varbinds = client.get(&device, &[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("sysDescr: {}", varbinds[0].value);
//!     Ok(())
//! }
//! ```
//!
//! ## SNMPv3 Example
//!
//! ```rust,no_run
//! use snmp_monitor::{ClientConfig, SnmpClient};
//! use snmp_monitor::device::{SnmpCredentials, SnmpDevice};
//! use snmp_monitor::v3::{AuthProtocol, PrivProtocol};
//!
//! #[tokio::main]
//! async fn main() -> snmp_monitor::Result<()> {
//!     let credentials = SnmpCredentials::v3("admin")
//!         .auth(AuthProtocol::Sha256, "authpass123")
//!         .privacy(PrivProtocol::Aes128, "privpass123");
//!     let device = SnmpDevice::new("192.168.1.1", credentials);
//!
//!     let client = SnmpClient::new(ClientConfig::default());
//!     let info = client.get_system_info(&device).await?;
//!     println!("{:?}", info.sys_name);
//!     Ok(())
//! }
//! ```

pub mod ber;
pub mod cache;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod poller;
pub mod transport;
pub mod v3;
pub mod validate;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

pub use cache::{CacheStats, ResponseCache};
pub use client::{ClientConfig, ConnectionTest, InterfaceRecord, SetResult, SnmpClient, SystemInfo};
pub use device::{SnmpCredentials, SnmpDevice, TransportKind};
pub use error::{AuthFailure, Error, ErrorStatus, Result, WalkAbortReason};
pub use message::SecurityLevel;
pub use oid::Oid;
pub use pdu::{Pdu, PduType};
pub use poller::{DeviceStatus, InterfaceStatus, Poller};
pub use transport::{Connector, NetConnector, Transport};
pub use v3::{AuthProtocol, EngineCache, PrivProtocol};
pub use validate::ValidationReport;
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
