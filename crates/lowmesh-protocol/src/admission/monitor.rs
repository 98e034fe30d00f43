use tracing::{debug, info, warn};

use crate::error::AdmissionRejected;

/// Current ingress-admission band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdmissionMode {
    Normal,
    Reduced,
    Blocked,
}

impl AdmissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Reduced => "reduced",
            Self::Blocked => "blocked",
        }
    }
}

/// Traffic classes, from least to most protected under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    /// Ordinary application traffic.
    Normal,
    /// Application traffic flagged priority in the datagram header.
    Priority,
    /// Routing and neighbor maintenance.
    Control,
    /// Key handshake traffic, including teardown.
    Security,
}

/// The kind of state an admission check is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Reassembly,
    Transaction,
    Neighbor,
    Inbound,
}

/// A transition between bands, reported upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandChange {
    pub from: AdmissionMode,
    pub to: AdmissionMode,
    pub usage_percent: u8,
}

/// Thresholds and sizes for the memory monitor.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    pub heap_budget_bytes: usize,
    pub high_enter_percent: u8,
    pub high_exit_percent: u8,
    pub critical_enter_percent: u8,
    pub critical_exit_percent: u8,
    /// Reservations or releases at least this large re-evaluate the band
    /// immediately instead of waiting for the next tick.
    pub large_allocation_bytes: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            heap_budget_bytes: 64 * 1024,
            high_enter_percent: 80,
            high_exit_percent: 70,
            critical_enter_percent: 95,
            critical_exit_percent: 90,
            large_allocation_bytes: 1024,
        }
    }
}

impl AdmissionConfig {
    /// Check the threshold ordering the hysteresis depends on.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.heap_budget_bytes == 0 {
            return Err("heap budget must be non-zero");
        }
        if self.critical_enter_percent > 100 {
            return Err("thresholds are percentages");
        }
        if self.high_exit_percent >= self.high_enter_percent {
            return Err("high exit threshold must be below high enter threshold");
        }
        if self.critical_exit_percent >= self.critical_enter_percent {
            return Err("critical exit threshold must be below critical enter threshold");
        }
        if self.high_enter_percent > self.critical_enter_percent {
            return Err("high enter threshold must not exceed critical enter threshold");
        }
        Ok(())
    }
}

/// Process-wide memory pressure state for one interface.
#[derive(Debug)]
pub struct MemoryMonitor {
    config: AdmissionConfig,
    /// Bytes reserved by stack components.
    reserved_bytes: usize,
    /// Heap usage reported from outside the accounted components.
    external_bytes: usize,
    mode: AdmissionMode,
    changes: Vec<BandChange>,
}

impl MemoryMonitor {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            reserved_bytes: 0,
            external_bytes: 0,
            mode: AdmissionMode::Normal,
            changes: Vec::new(),
        }
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn used_bytes(&self) -> usize {
        self.reserved_bytes.saturating_add(self.external_bytes)
    }

    pub fn reserved_bytes(&self) -> usize {
        self.reserved_bytes
    }

    /// Heap usage as a percentage of the budget, capped at 100.
    pub fn usage_percent(&self) -> u8 {
        let pct = self.used_bytes().saturating_mul(100) / self.config.heap_budget_bytes.max(1);
        pct.min(100) as u8
    }

    /// Account `bytes` of newly admitted state.
    pub fn reserve(&mut self, bytes: usize) {
        self.reserved_bytes = self.reserved_bytes.saturating_add(bytes);
        if bytes >= self.config.large_allocation_bytes {
            self.evaluate();
        }
    }

    /// Return `bytes` previously passed to [`MemoryMonitor::reserve`].
    pub fn release(&mut self, bytes: usize) {
        self.reserved_bytes = self.reserved_bytes.saturating_sub(bytes);
        if bytes >= self.config.large_allocation_bytes {
            self.evaluate();
        }
    }

    /// Report heap usage observed outside the stack (allocator statistics,
    /// or synthetic pressure in tests). Re-evaluates immediately.
    pub fn set_used_bytes(&mut self, bytes: usize) {
        self.external_bytes = bytes;
        self.evaluate();
    }

    /// Periodic re-evaluation. Returns the band in force afterwards.
    pub fn evaluate(&mut self) -> AdmissionMode {
        let pct = self.usage_percent();
        let cfg = &self.config;
        let next = match self.mode {
            AdmissionMode::Normal => {
                if pct >= cfg.critical_enter_percent {
                    AdmissionMode::Blocked
                } else if pct >= cfg.high_enter_percent {
                    AdmissionMode::Reduced
                } else {
                    AdmissionMode::Normal
                }
            }
            AdmissionMode::Reduced => {
                if pct >= cfg.critical_enter_percent {
                    AdmissionMode::Blocked
                } else if pct < cfg.high_exit_percent {
                    AdmissionMode::Normal
                } else {
                    AdmissionMode::Reduced
                }
            }
            AdmissionMode::Blocked => {
                if pct >= cfg.critical_exit_percent {
                    AdmissionMode::Blocked
                } else if pct < cfg.high_exit_percent {
                    AdmissionMode::Normal
                } else {
                    AdmissionMode::Reduced
                }
            }
        };

        if next != self.mode {
            info!(
                from = self.mode.as_str(),
                to = next.as_str(),
                usage_percent = pct,
                "admission: band change"
            );
            self.changes.push(BandChange {
                from: self.mode,
                to: next,
                usage_percent: pct,
            });
            self.mode = next;
        }
        self.mode
    }

    /// Band changes recorded since the last call.
    pub fn take_band_changes(&mut self) -> Vec<BandChange> {
        std::mem::take(&mut self.changes)
    }

    /// Gate creation of new state of `kind` for traffic of `class`.
    pub fn check_new_state(&self, class: TrafficClass, kind: StateKind) -> Result<(), AdmissionRejected> {
        let allowed = match self.mode {
            AdmissionMode::Normal => true,
            AdmissionMode::Reduced => class != TrafficClass::Normal,
            AdmissionMode::Blocked => class == TrafficClass::Security,
        };
        self.verdict(allowed, class, kind)
    }

    /// Gate processing of a newly received packet of `class`.
    pub fn check_inbound(&self, class: TrafficClass) -> Result<(), AdmissionRejected> {
        let allowed = match self.mode {
            AdmissionMode::Normal | AdmissionMode::Reduced => true,
            AdmissionMode::Blocked => {
                matches!(class, TrafficClass::Control | TrafficClass::Security)
            }
        };
        self.verdict(allowed, class, StateKind::Inbound)
    }

    fn verdict(&self, allowed: bool, class: TrafficClass, kind: StateKind) -> Result<(), AdmissionRejected> {
        if allowed {
            return Ok(());
        }
        let rejected = AdmissionRejected {
            mode: self.mode,
            class,
            kind,
        };
        if kind == StateKind::Inbound {
            debug!(?class, mode = self.mode.as_str(), "admission: inbound dropped");
        } else {
            warn!(?class, ?kind, mode = self.mode.as_str(), "admission: new state rejected");
        }
        Err(rejected)
    }
}
