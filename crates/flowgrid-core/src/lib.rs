//! Core controller logic: topology classification, router bootstrap,
//! pair-based policy rendering, and the single-writer control loop.

pub mod bootstrap;
pub mod classify;
pub mod config;
pub mod conn;
pub mod controller;
pub mod error;
pub mod flows;
pub mod l2;
pub mod model;
pub mod policy;
pub mod state;

pub use bootstrap::{BootstrapFailure, BootstrapState};
pub use config::{
    BootstrapSettings, CidrAddr, ControllerConfig, CookieTags, DEFAULT_L2_CAPACITY, LanId,
    NetworkPlan, Priorities, RestSettings, RouterPlan,
};
pub use conn::{SwitchConn, SwitchHandle};
pub use controller::{
    Command, CommandResult, ControlHandle, ControlMsg, Controller, Event, PacketIn,
};
pub use error::CoreError;
pub use model::{AllowedPair, HostRecord, MacAddr, RouterPorts, SwitchRole};
pub use state::TopologySnapshot;
