//! Admission controller: heap-pressure banding with hysteresis.
//!
//! Components that create new state (reassembly contexts, CoAP transactions,
//! neighbor entries) consult the [`MemoryMonitor`] first. Work that was
//! already admitted is never aborted by a band change.
//!
//! ```text
//!          >= high_enter            >= critical_enter
//!  Normal ---------------> Reduced -------------------> Blocked
//!         <---------------         <-------------------
//!          <  high_exit              <  critical_exit
//! ```

pub mod monitor;

pub use monitor::{AdmissionConfig, AdmissionMode, BandChange, MemoryMonitor, StateKind, TrafficClass};
