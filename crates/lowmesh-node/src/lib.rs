//! Node runtime for the lowmesh stack.
//!
//! [`MeshStack`] is the sequential owner of one mesh interface. This crate
//! also provides its boundaries (radio driver, persistence, application
//! handler), TOML configuration, logging setup and the tokio runner used
//! by the `lowmesh-node` binary.

pub mod config;
pub mod error;
pub mod events;
pub mod handler;
pub mod logging;
pub mod radio;
pub mod runner;
pub mod security_ops;
pub mod stack;
pub mod storage;
pub mod storage_codec;
pub mod triage;

pub use config::NodeConfig;
pub use error::{FrameDrop, NodeError, SendError};
pub use events::{FailureReason, StackEvent};
pub use handler::EchoHandler;
pub use radio::{LoopbackRadio, MemoryRadio, NullRadio, RadioDriver, RadioError, RxFrame};
pub use runner::{InterfaceHandle, InterfaceTask, RunnerOptions, ShutdownHandle, run_interface, spawn_interface};
pub use stack::{Checkpoint, MeshStack, StackConfig};
pub use storage::Storage;
