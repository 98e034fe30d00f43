//! TOML configuration for a lowmesh node.
//!
//! [`NodeConfig`] mirrors the file layout and keeps every value as written.
//! [`NodeConfig::to_stack_config`] validates it into the runtime
//! [`StackConfig`]; anything that cannot be turned into a working interface
//! is a [`NodeError::Config`] and stops the node at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use lowmesh_core::{LinkAddr, PanId};
use lowmesh_protocol::AdmissionConfig;
use lowmesh_protocol::coap::CoapConfig;
use lowmesh_protocol::coap::constants::{
    DEFAULT_ACK_RANDOM_FACTOR, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_DEDUP_CAPACITY, DEFAULT_EXCHANGE_LIFETIME_MS,
    DEFAULT_MAX_RETRANSMIT, DEFAULT_MAX_TRANSACTIONS, DEFAULT_NON_LIFETIME_MS,
};
use lowmesh_protocol::eapol::{RetryPolicy, TimingProfile};
use lowmesh_transport::fhss::constants::{
    DEFAULT_BROADCAST_DWELL_MS, DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_CHANNEL_COUNT, DEFAULT_UNICAST_DWELL_MS,
};
use lowmesh_transport::fhss::{ChannelFunction, FhssConfig};
use lowmesh_transport::frag::{
    DEFAULT_FRAGMENT_PAYLOAD_SIZE, DEFAULT_MAX_CONTEXTS, DEFAULT_REASSEMBLY_TIMEOUT_MS, ReassemblyConfig,
};
use lowmesh_transport::neighbor::{DEFAULT_MAX_NEIGHBORS, DEFAULT_NEIGHBOR_TIMEOUT_MS, NeighborConfig};
use lowmesh_transport::rpl::constants::{
    DEFAULT_ADVERTISEMENT_INTERVAL_MS, DEFAULT_MAX_ROUTES, DEFAULT_MIN_HOP_RANK_INCREASE, DEFAULT_ROUTE_LIFETIME_MS,
};
use lowmesh_transport::rpl::{DodagRole, RoutingConfig};

use crate::error::NodeError;
use crate::stack::StackConfig;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub fhss: FhssSection,
    #[serde(default)]
    pub fragmentation: FragmentationSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub coap: CoapSection,
    #[serde(default)]
    pub admission: AdmissionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// Validate into the runtime configuration of one interface.
    pub fn to_stack_config(&self) -> Result<StackConfig, NodeError> {
        let link_addr = self.node.link_addr()?;
        let pmk = self.security.pmk()?;
        let role = match self.node.role.as_str() {
            "border-router" => DodagRole::BorderRouter,
            "router" => DodagRole::Router,
            other => {
                return Err(NodeError::Config(format!(
                    "node.role must be \"border-router\" or \"router\", got \"{other}\""
                )));
            }
        };
        let timing: TimingProfile = self
            .security
            .timing
            .parse()
            .map_err(|e| NodeError::Config(format!("security.timing: {e}")))?;
        if self.security.pairwise_key_lifetime_secs == 0 || self.security.group_key_lifetime_secs == 0 {
            return Err(NodeError::Config("key lifetimes must be non-zero".into()));
        }
        let retry_policy = match &self.security.retry {
            Some(retry) => {
                let policy = retry.apply(timing.policy());
                policy
                    .validate()
                    .map_err(|e| NodeError::Config(format!("security.retry: {e}")))?;
                Some(policy)
            }
            None => None,
        };

        let fhss = self.fhss.to_fhss_config()?;
        fhss.validate().map_err(|e| NodeError::Config(format!("fhss: {e}")))?;

        let frag = &self.fragmentation;
        if frag.fragment_payload_size == 0 || frag.fragment_payload_size % 8 != 0 {
            return Err(NodeError::Config(format!(
                "fragmentation.fragment_payload_size must be a non-zero multiple of 8, got {}",
                frag.fragment_payload_size
            )));
        }
        if frag.max_contexts == 0 {
            return Err(NodeError::Config("fragmentation.max_contexts must be non-zero".into()));
        }

        let routing = &self.routing;
        if routing.max_neighbors == 0 || routing.max_routes == 0 {
            return Err(NodeError::Config("routing table sizes must be non-zero".into()));
        }
        if routing.advertisement_interval_ms == 0 {
            return Err(NodeError::Config("routing.advertisement_interval_ms must be non-zero".into()));
        }

        let coap = self.coap.to_coap_config();
        if coap.ack_random_factor < 1.0 {
            return Err(NodeError::Config(format!(
                "coap.ack_random_factor must be at least 1.0, got {}",
                coap.ack_random_factor
            )));
        }
        if coap.max_transactions == 0 || coap.dedup_capacity == 0 {
            return Err(NodeError::Config("coap table sizes must be non-zero".into()));
        }

        let admission = self.admission.to_admission_config();
        admission
            .validate()
            .map_err(|e| NodeError::Config(format!("admission: {e}")))?;

        Ok(StackConfig {
            link_addr,
            pan_id: PanId(self.node.pan_id),
            role,
            pmk,
            timing,
            retry_policy,
            pairwise_key_lifetime_ms: self.security.pairwise_key_lifetime_secs * 1000,
            group_key_lifetime_ms: self.security.group_key_lifetime_secs * 1000,
            fhss,
            fragment_payload_size: frag.fragment_payload_size,
            reassembly: ReassemblyConfig {
                timeout_ms: frag.reassembly_timeout_ms,
                max_contexts: frag.max_contexts,
            },
            neighbors: NeighborConfig {
                max_neighbors: routing.max_neighbors,
                timeout_ms: routing.neighbor_timeout_ms,
            },
            routing: RoutingConfig {
                max_routes: routing.max_routes,
                route_lifetime_ms: routing.route_lifetime_ms,
            },
            min_hop_rank_increase: routing.min_hop_rank_increase,
            advertisement_interval_ms: routing.advertisement_interval_ms,
            coap,
            admission,
            mac_max_retries: self.node.mac_max_retries,
            seed: None,
        })
    }

    /// Storage directory, or `None` when persistence is disabled.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        if !self.node.enable_storage {
            return None;
        }
        Some(match &self.node.storage_path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_local_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lowmesh")
                .join("storage"),
        })
    }
}

/// The `[node]` section.
#[derive(Debug, Deserialize)]
pub struct NodeSection {
    /// EUI-64 as 16 hex digits.
    pub link_addr: Option<String>,
    #[serde(default = "default_pan_id")]
    pub pan_id: u16,
    #[serde(default = "default_role")]
    pub role: String,
    /// Custom storage directory. Defaults to the platform data directory.
    pub storage_path: Option<String>,
    #[serde(default = "default_enable_storage")]
    pub enable_storage: bool,
    /// Link-layer retries for a busy channel or a missing ack.
    #[serde(default = "default_mac_max_retries")]
    pub mac_max_retries: u8,
}

fn default_pan_id() -> u16 {
    0x00AB
}

fn default_role() -> String {
    "router".to_string()
}

fn default_enable_storage() -> bool {
    true
}

fn default_mac_max_retries() -> u8 {
    3
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            link_addr: None,
            pan_id: default_pan_id(),
            role: default_role(),
            storage_path: None,
            enable_storage: default_enable_storage(),
            mac_max_retries: default_mac_max_retries(),
        }
    }
}

impl NodeSection {
    fn link_addr(&self) -> Result<LinkAddr, NodeError> {
        let text = self
            .link_addr
            .as_deref()
            .ok_or_else(|| NodeError::Config("node.link_addr is required".into()))?;
        let addr: LinkAddr = text
            .parse()
            .map_err(|e| NodeError::Config(format!("node.link_addr: {e}")))?;
        if addr.is_broadcast() {
            return Err(NodeError::Config("node.link_addr may not be the broadcast address".into()));
        }
        Ok(addr)
    }
}

/// The `[security]` section.
#[derive(Debug, Deserialize)]
pub struct SecuritySection {
    /// Shared master key as 64 hex digits. No default exists.
    pub pmk: Option<String>,
    #[serde(default = "default_timing")]
    pub timing: String,
    #[serde(default = "default_pairwise_key_lifetime_secs")]
    pub pairwise_key_lifetime_secs: u64,
    #[serde(default = "default_group_key_lifetime_secs")]
    pub group_key_lifetime_secs: u64,
    /// `[security.retry]`: overrides the retry table of `timing`.
    #[serde(default)]
    pub retry: Option<RetrySection>,
}

fn default_timing() -> String {
    TimingProfile::default().as_str().to_string()
}

fn default_pairwise_key_lifetime_secs() -> u64 {
    86_400
}

fn default_group_key_lifetime_secs() -> u64 {
    30 * 86_400
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            pmk: None,
            timing: default_timing(),
            pairwise_key_lifetime_secs: default_pairwise_key_lifetime_secs(),
            group_key_lifetime_secs: default_group_key_lifetime_secs(),
            retry: None,
        }
    }
}

impl SecuritySection {
    fn pmk(&self) -> Result<[u8; 32], NodeError> {
        let text = self
            .pmk
            .as_deref()
            .ok_or_else(|| NodeError::Config("security.pmk is required".into()))?;
        let bytes = hex::decode(text).map_err(|e| NodeError::Config(format!("security.pmk: {e}")))?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| NodeError::Config(format!("security.pmk must be 32 bytes, got {}", bytes.len())))
    }
}

/// The `[security.retry]` table. Omitted fields keep the value of the
/// timing profile.
#[derive(Debug, Default, Deserialize)]
pub struct RetrySection {
    pub max_retries: Option<u8>,
    pub initial_timeout_ms: Option<u64>,
    pub backoff_factor: Option<u32>,
    pub max_timeout_ms: Option<u64>,
}

impl RetrySection {
    fn apply(&self, base: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            initial_timeout_ms: self.initial_timeout_ms.unwrap_or(base.initial_timeout_ms),
            backoff_factor: self.backoff_factor.unwrap_or(base.backoff_factor),
            max_timeout_ms: self.max_timeout_ms.unwrap_or(base.max_timeout_ms),
        }
    }
}

/// The `[fhss]` section.
#[derive(Debug, Deserialize)]
pub struct FhssSection {
    #[serde(default = "default_channel_function")]
    pub channel_function: String,
    #[serde(default = "default_channel_count")]
    pub channel_count: u8,
    #[serde(default)]
    pub excluded_channels: Vec<u8>,
    /// Only used with `channel_function = "fixed"`.
    #[serde(default)]
    pub fixed_channel: u8,
    #[serde(default = "default_unicast_dwell_ms")]
    pub unicast_dwell_ms: u32,
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u32,
    #[serde(default = "default_broadcast_dwell_ms")]
    pub broadcast_dwell_ms: u32,
    #[serde(default)]
    pub broadcast_schedule_id: u16,
}

fn default_channel_function() -> String {
    "tr51".to_string()
}

fn default_channel_count() -> u8 {
    DEFAULT_CHANNEL_COUNT
}

fn default_unicast_dwell_ms() -> u32 {
    DEFAULT_UNICAST_DWELL_MS
}

fn default_broadcast_interval_ms() -> u32 {
    DEFAULT_BROADCAST_INTERVAL_MS
}

fn default_broadcast_dwell_ms() -> u32 {
    DEFAULT_BROADCAST_DWELL_MS
}

impl Default for FhssSection {
    fn default() -> Self {
        Self {
            channel_function: default_channel_function(),
            channel_count: default_channel_count(),
            excluded_channels: Vec::new(),
            fixed_channel: 0,
            unicast_dwell_ms: default_unicast_dwell_ms(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            broadcast_dwell_ms: default_broadcast_dwell_ms(),
            broadcast_schedule_id: 0,
        }
    }
}

impl FhssSection {
    fn to_fhss_config(&self) -> Result<FhssConfig, NodeError> {
        let function = match self.channel_function.as_str() {
            "fixed" => ChannelFunction::Fixed(self.fixed_channel),
            "tr51" => ChannelFunction::Tr51,
            "dh1cf" => ChannelFunction::Dh1cf,
            other => {
                return Err(NodeError::Config(format!(
                    "fhss.channel_function must be \"fixed\", \"tr51\" or \"dh1cf\", got \"{other}\""
                )));
            }
        };
        Ok(FhssConfig {
            function,
            channel_count: self.channel_count,
            excluded_channels: self.excluded_channels.clone(),
            unicast_dwell_ms: self.unicast_dwell_ms,
            broadcast_interval_ms: self.broadcast_interval_ms,
            broadcast_dwell_ms: self.broadcast_dwell_ms,
            broadcast_schedule_id: self.broadcast_schedule_id,
        })
    }
}

/// The `[fragmentation]` section.
#[derive(Debug, Deserialize)]
pub struct FragmentationSection {
    #[serde(default = "default_fragment_payload_size")]
    pub fragment_payload_size: usize,
    #[serde(default = "default_reassembly_timeout_ms")]
    pub reassembly_timeout_ms: u64,
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,
}

fn default_fragment_payload_size() -> usize {
    DEFAULT_FRAGMENT_PAYLOAD_SIZE
}

fn default_reassembly_timeout_ms() -> u64 {
    DEFAULT_REASSEMBLY_TIMEOUT_MS
}

fn default_max_contexts() -> usize {
    DEFAULT_MAX_CONTEXTS
}

impl Default for FragmentationSection {
    fn default() -> Self {
        Self {
            fragment_payload_size: default_fragment_payload_size(),
            reassembly_timeout_ms: default_reassembly_timeout_ms(),
            max_contexts: default_max_contexts(),
        }
    }
}

/// The `[routing]` section.
#[derive(Debug, Deserialize)]
pub struct RoutingSection {
    #[serde(default = "default_advertisement_interval_ms")]
    pub advertisement_interval_ms: u64,
    #[serde(default = "default_neighbor_timeout_ms")]
    pub neighbor_timeout_ms: u64,
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    #[serde(default = "default_max_routes")]
    pub max_routes: usize,
    #[serde(default = "default_route_lifetime_ms")]
    pub route_lifetime_ms: u64,
    #[serde(default = "default_min_hop_rank_increase")]
    pub min_hop_rank_increase: u16,
}

fn default_advertisement_interval_ms() -> u64 {
    DEFAULT_ADVERTISEMENT_INTERVAL_MS
}

fn default_neighbor_timeout_ms() -> u64 {
    DEFAULT_NEIGHBOR_TIMEOUT_MS
}

fn default_max_neighbors() -> usize {
    DEFAULT_MAX_NEIGHBORS
}

fn default_max_routes() -> usize {
    DEFAULT_MAX_ROUTES
}

fn default_route_lifetime_ms() -> u64 {
    DEFAULT_ROUTE_LIFETIME_MS
}

fn default_min_hop_rank_increase() -> u16 {
    DEFAULT_MIN_HOP_RANK_INCREASE
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            advertisement_interval_ms: default_advertisement_interval_ms(),
            neighbor_timeout_ms: default_neighbor_timeout_ms(),
            max_neighbors: default_max_neighbors(),
            max_routes: default_max_routes(),
            route_lifetime_ms: default_route_lifetime_ms(),
            min_hop_rank_increase: default_min_hop_rank_increase(),
        }
    }
}

/// The `[coap]` section.
#[derive(Debug, Deserialize)]
pub struct CoapSection {
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_ack_random_factor")]
    pub ack_random_factor: f64,
    #[serde(default = "default_max_retransmit")]
    pub max_retransmit: u8,
    #[serde(default = "default_non_lifetime_ms")]
    pub non_lifetime_ms: u64,
    #[serde(default = "default_exchange_lifetime_ms")]
    pub exchange_lifetime_ms: u64,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,
}

fn default_ack_timeout_ms() -> u64 {
    DEFAULT_ACK_TIMEOUT_MS
}

fn default_ack_random_factor() -> f64 {
    DEFAULT_ACK_RANDOM_FACTOR
}

fn default_max_retransmit() -> u8 {
    DEFAULT_MAX_RETRANSMIT
}

fn default_non_lifetime_ms() -> u64 {
    DEFAULT_NON_LIFETIME_MS
}

fn default_exchange_lifetime_ms() -> u64 {
    DEFAULT_EXCHANGE_LIFETIME_MS
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_max_transactions() -> usize {
    DEFAULT_MAX_TRANSACTIONS
}

impl Default for CoapSection {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_ack_timeout_ms(),
            ack_random_factor: default_ack_random_factor(),
            max_retransmit: default_max_retransmit(),
            non_lifetime_ms: default_non_lifetime_ms(),
            exchange_lifetime_ms: default_exchange_lifetime_ms(),
            dedup_capacity: default_dedup_capacity(),
            max_transactions: default_max_transactions(),
        }
    }
}

impl CoapSection {
    fn to_coap_config(&self) -> CoapConfig {
        CoapConfig {
            ack_timeout_ms: self.ack_timeout_ms,
            ack_random_factor: self.ack_random_factor,
            max_retransmit: self.max_retransmit,
            non_lifetime_ms: self.non_lifetime_ms,
            exchange_lifetime_ms: self.exchange_lifetime_ms,
            dedup_capacity: self.dedup_capacity,
            max_transactions: self.max_transactions,
        }
    }
}

/// The `[admission]` section.
#[derive(Debug, Deserialize)]
pub struct AdmissionSection {
    #[serde(default = "default_heap_budget_bytes")]
    pub heap_budget_bytes: usize,
    #[serde(default = "default_high_enter_percent")]
    pub high_enter_percent: u8,
    #[serde(default = "default_high_exit_percent")]
    pub high_exit_percent: u8,
    #[serde(default = "default_critical_enter_percent")]
    pub critical_enter_percent: u8,
    #[serde(default = "default_critical_exit_percent")]
    pub critical_exit_percent: u8,
    #[serde(default = "default_large_allocation_bytes")]
    pub large_allocation_bytes: usize,
    /// Maintenance tick period of the interface task.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_heap_budget_bytes() -> usize {
    AdmissionConfig::default().heap_budget_bytes
}

fn default_high_enter_percent() -> u8 {
    AdmissionConfig::default().high_enter_percent
}

fn default_high_exit_percent() -> u8 {
    AdmissionConfig::default().high_exit_percent
}

fn default_critical_enter_percent() -> u8 {
    AdmissionConfig::default().critical_enter_percent
}

fn default_critical_exit_percent() -> u8 {
    AdmissionConfig::default().critical_exit_percent
}

fn default_large_allocation_bytes() -> usize {
    AdmissionConfig::default().large_allocation_bytes
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for AdmissionSection {
    fn default() -> Self {
        Self {
            heap_budget_bytes: default_heap_budget_bytes(),
            high_enter_percent: default_high_enter_percent(),
            high_exit_percent: default_high_exit_percent(),
            critical_enter_percent: default_critical_enter_percent(),
            critical_exit_percent: default_critical_exit_percent(),
            large_allocation_bytes: default_large_allocation_bytes(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl AdmissionSection {
    fn to_admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            heap_budget_bytes: self.heap_budget_bytes,
            high_enter_percent: self.high_enter_percent,
            high_exit_percent: self.high_exit_percent,
            critical_enter_percent: self.critical_enter_percent,
            critical_exit_percent: self.critical_exit_percent,
            large_allocation_bytes: self.large_allocation_bytes,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `"text"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PMK: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn minimal() -> String {
        format!(
            r#"
[node]
link_addr = "0211223344556677"

[security]
pmk = "{PMK}"
"#
        )
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = NodeConfig::parse(&minimal()).unwrap();
        let stack = config.to_stack_config().unwrap();
        assert_eq!(stack.link_addr, "0211223344556677".parse::<LinkAddr>().unwrap());
        assert_eq!(stack.role, DodagRole::Router);
        assert_eq!(stack.timing, TimingProfile::Medium);
        assert_eq!(stack.retry_policy, None);
        assert_eq!(stack.retry_policy(), TimingProfile::Medium.policy());
        assert_eq!(stack.pmk[31], 0x1f);
        assert_eq!(stack.fragment_payload_size, DEFAULT_FRAGMENT_PAYLOAD_SIZE);
        assert_eq!(stack.coap.max_retransmit, DEFAULT_MAX_RETRANSMIT);
        assert_eq!(stack.fhss.function, ChannelFunction::Tr51);
        assert_eq!(config.admission.tick_ms, 100);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = format!(
            r#"
[node]
link_addr = "0a0b0c0d0e0f1011"
pan_id = 4660
role = "border-router"
storage_path = "/var/lib/lowmesh"
enable_storage = true
mac_max_retries = 5

[security]
pmk = "{PMK}"
timing = "very-slow"
pairwise_key_lifetime_secs = 3600
group_key_lifetime_secs = 7200

[fhss]
channel_function = "fixed"
fixed_channel = 11
channel_count = 16
excluded_channels = [2, 3]
unicast_dwell_ms = 200
broadcast_interval_ms = 2000
broadcast_dwell_ms = 100
broadcast_schedule_id = 9

[fragmentation]
fragment_payload_size = 96
reassembly_timeout_ms = 5000
max_contexts = 2

[routing]
advertisement_interval_ms = 1000
neighbor_timeout_ms = 30000
max_neighbors = 4
max_routes = 8
min_hop_rank_increase = 128

[coap]
ack_timeout_ms = 500
ack_random_factor = 1.0
max_retransmit = 2
non_lifetime_ms = 1000
exchange_lifetime_ms = 2000
dedup_capacity = 4
max_transactions = 3

[admission]
heap_budget_bytes = 4096
high_enter_percent = 60
high_exit_percent = 50
critical_enter_percent = 90
critical_exit_percent = 80
large_allocation_bytes = 256
tick_ms = 20

[logging]
level = "debug"
format = "json"
"#
        );
        let config = NodeConfig::parse(&toml).unwrap();
        let stack = config.to_stack_config().unwrap();
        assert_eq!(stack.pan_id, PanId(4660));
        assert_eq!(stack.role, DodagRole::BorderRouter);
        assert_eq!(stack.timing, TimingProfile::VerySlow);
        assert_eq!(stack.pairwise_key_lifetime_ms, 3_600_000);
        assert_eq!(stack.group_key_lifetime_ms, 7_200_000);
        assert_eq!(stack.fhss.function, ChannelFunction::Fixed(11));
        assert_eq!(stack.fhss.excluded_channels, vec![2, 3]);
        assert_eq!(stack.fragment_payload_size, 96);
        assert_eq!(stack.reassembly.max_contexts, 2);
        assert_eq!(stack.neighbors.max_neighbors, 4);
        assert_eq!(stack.routing.max_routes, 8);
        assert_eq!(stack.min_hop_rank_increase, 128);
        assert_eq!(stack.coap.max_transactions, 3);
        assert_eq!(stack.admission.heap_budget_bytes, 4096);
        assert_eq!(stack.mac_max_retries, 5);
        assert_eq!(config.storage_dir(), Some(PathBuf::from("/var/lib/lowmesh")));
        assert_eq!(config.admission.tick_ms, 20);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_pmk_is_fatal() {
        let config = NodeConfig::parse("[node]\nlink_addr = \"0211223344556677\"\n").unwrap();
        let err = config.to_stack_config().unwrap_err();
        assert!(matches!(err, NodeError::Config(ref msg) if msg.contains("security.pmk")));
    }

    #[test]
    fn test_short_pmk_is_rejected() {
        let config = NodeConfig::parse(
            "[node]\nlink_addr = \"0211223344556677\"\n[security]\npmk = \"0011\"\n",
        )
        .unwrap();
        assert!(config.to_stack_config().is_err());
    }

    #[test]
    fn test_missing_link_addr_is_fatal() {
        let config = NodeConfig::parse(&format!("[security]\npmk = \"{PMK}\"\n")).unwrap();
        assert!(matches!(config.to_stack_config(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_unknown_timing_profile() {
        let toml = minimal() + "timing = \"warp\"\n";
        let err = NodeConfig::parse(&toml).unwrap().to_stack_config().unwrap_err();
        assert!(err.to_string().contains("warp"));
    }

    #[test]
    fn test_retry_override_fills_from_timing_profile() {
        let toml = minimal() + "timing = \"fast\"\n[security.retry]\nmax_retries = 1\nmax_timeout_ms = 1500\n";
        let stack = NodeConfig::parse(&toml).unwrap().to_stack_config().unwrap();
        let fast = TimingProfile::Fast.policy();
        assert_eq!(
            stack.retry_policy(),
            RetryPolicy {
                max_retries: 1,
                initial_timeout_ms: fast.initial_timeout_ms,
                backoff_factor: fast.backoff_factor,
                max_timeout_ms: 1_500,
            }
        );
        assert_eq!(stack.retry_policy().total_window_ms(), 1_000 + 1_500);
    }

    #[test]
    fn test_invalid_retry_override() {
        for table in ["initial_timeout_ms = 0", "backoff_factor = 0", "max_timeout_ms = 10"] {
            let toml = minimal() + "[security.retry]\n" + table + "\n";
            let err = NodeConfig::parse(&toml).unwrap().to_stack_config().unwrap_err();
            assert!(err.to_string().contains("security.retry"), "{table}: {err}");
        }
    }

    #[test]
    fn test_every_channel_excluded_is_fatal() {
        let toml = minimal() + "[fhss]\nchannel_count = 2\nexcluded_channels = [0, 1]\n";
        let config = NodeConfig::parse(&toml).unwrap();
        // Exclusion is only detected when the sequence is built.
        let stack = config.to_stack_config().unwrap();
        assert!(crate::stack::MeshStack::new(stack, crate::radio::NullRadio).is_err());
    }

    #[test]
    fn test_bad_fragment_size() {
        let toml = minimal() + "[fragmentation]\nfragment_payload_size = 100\n";
        assert!(NodeConfig::parse(&toml).unwrap().to_stack_config().is_err());
    }

    #[test]
    fn test_inverted_admission_thresholds() {
        let toml = minimal() + "[admission]\nhigh_enter_percent = 50\nhigh_exit_percent = 60\n";
        assert!(NodeConfig::parse(&toml).unwrap().to_stack_config().is_err());
    }

    #[test]
    fn test_storage_disabled() {
        let toml = minimal().replace("[node]\n", "[node]\nenable_storage = false\n");
        let config = NodeConfig::parse(&toml).unwrap();
        assert_eq!(config.storage_dir(), None);
    }

    #[test]
    fn test_malformed_toml() {
        assert!(NodeConfig::parse("[node\nbroken").is_err());
    }

    #[test]
    fn test_wrong_field_types() {
        assert!(NodeConfig::parse("[node]\npan_id = \"big\"\n").is_err());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = NodeConfig::parse("").unwrap();
        assert_eq!(config.node.role, "router");
        assert_eq!(config.routing.max_neighbors, DEFAULT_MAX_NEIGHBORS);
        assert!(config.node.enable_storage);
        assert!(config.to_stack_config().is_err());
    }
}
