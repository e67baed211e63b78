//! The pluggable probe module contract (spec.md §4.5): the layer that turns
//! targets into outgoing packets and raw response packets into classified
//! field records. Concrete modules (TCP SYN, ICMP echo, UDP, NTP, ...) live
//! in the sibling `ripple-probes` crate and register themselves into a
//! [`Registry`] looked up by name — no runtime code loading, just a
//! dispatch table (spec.md §9).

use std::any::Any;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::ScanConfig;
use crate::error::Result;
use crate::oracle::RunKey;
use crate::stats::StatsSnapshot;

/// Opaque per-thread state a probe module may stash between
/// `thread_initialize` and later calls on the same sender thread (e.g. a
/// per-thread RNG for payload randomness). The validation oracle, not this
/// state, is what carries information from send time to receive time.
pub type ThreadState = Box<dyn Any + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Bool,
    String,
    Binary,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// Whether every response of this probe module yields the same field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    Str(String),
    Binary(Vec<u8>),
    Null,
}

impl FieldValue {
    pub fn as_csv_cell(&self) -> String {
        match self {
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::Str(v) => v.clone(),
            FieldValue::Binary(v) => hex_encode(v),
            FieldValue::Null => String::new(),
        }
    }

    pub fn as_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Int(v) => serde_json::Value::from(*v),
            FieldValue::Bool(v) => serde_json::Value::from(*v),
            FieldValue::Str(v) => serde_json::Value::from(v.clone()),
            FieldValue::Binary(v) => serde_json::Value::from(hex_encode(v)),
            FieldValue::Null => serde_json::Value::Null,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// An ordered set of named fields, in the probe module's declared order.
/// Mandatory fields per spec.md §3: `classification`, `success`, `saddr`.
#[derive(Debug, Clone, Default)]
pub struct FieldRecord {
    fields: Vec<(&'static str, FieldValue)>,
}

impl FieldRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: FieldValue) -> &mut Self {
        self.fields.push((name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.fields.iter()
    }

    pub fn classification(&self) -> &str {
        match self.get("classification") {
            Some(FieldValue::Str(s)) => s,
            _ => "unknown",
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.get("success"), Some(FieldValue::Bool(true)))
    }

    pub fn saddr(&self) -> Option<Ipv4Addr> {
        match self.get("saddr") {
            Some(FieldValue::Str(s)) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Result of comparing a captured packet's embedded nonces against the
/// validation oracle's expected block. `reported_src_ip` lets a module
/// override the address attributed to the response — e.g. an ICMP
/// unreachable message reports the original target's address recovered
/// from the embedded inner IP header, not the router that sent the ICMP.
#[derive(Debug, Clone, Copy)]
pub enum ValidationOutcome {
    Rejected,
    Accepted { reported_src_ip: Ipv4Addr },
}

/// A named, registered probe: the contract of spec.md §4.5.
pub trait ProbeModule: Send + Sync {
    fn name(&self) -> &'static str;
    fn pcap_filter(&self) -> &str;
    fn max_packet_length(&self) -> usize;
    fn fields(&self) -> &[FieldDef];
    fn output_type(&self) -> OutputType;
    fn port_args(&self) -> bool;

    /// Once per process.
    fn global_initialize(&self, args: &HashMap<String, String>) -> Result<()>;

    /// Once per sender thread.
    fn thread_initialize(&self) -> ThreadState;

    /// Builds the static L2+L3+L4 header template, once per sender thread.
    fn prepare_packet(
        &self,
        buf: &mut Vec<u8>,
        src_mac: [u8; 6],
        gw_mac: [u8; 6],
        state: &mut ThreadState,
    );

    /// Fills per-target fields and checksums into the prepared template.
    #[allow(clippy::too_many_arguments)]
    fn make_packet(
        &self,
        buf: &mut [u8],
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        run_key: &RunKey,
        stream_index: u32,
        state: &mut ThreadState,
    );

    /// Checks a captured frame's IP payload against the expected validation
    /// derived from the 3-tuple the receiver believes this is a response to.
    fn validate_packet(
        &self,
        ip_payload: &[u8],
        run_key: &RunKey,
        source_port_range: (u16, u16),
        validate_source_port: bool,
    ) -> ValidationOutcome;

    /// Populates a field record from a validated response.
    fn process_packet(
        &self,
        ip_payload: &[u8],
        reported_src_ip: Ipv4Addr,
        timestamp: Duration,
    ) -> FieldRecord;

    /// Cleanup at process exit. `send_stats` and `recv_stats` both alias
    /// the single counters struct this crate shares between sender and
    /// receiver threads (spec.md §4.5 models them as the sender side's and
    /// the receiver side's final counts; this crate doesn't split `Stats`
    /// into two structs, so a module reads whichever fields it needs from
    /// either parameter) — present so a module can log a final
    /// protocol-specific summary with the scan's configuration in view.
    fn close(&self, _config: &ScanConfig, _send_stats: &StatsSnapshot, _recv_stats: &StatsSnapshot) {}
}

/// Process-wide registry mapping a probe module name to its implementation
/// — a dispatch table, not a function-pointer struct (spec.md §9).
#[derive(Default)]
pub struct Registry {
    modules: HashMap<&'static str, std::sync::Arc<dyn ProbeModule>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: std::sync::Arc<dyn ProbeModule>) {
        self.modules.insert(module.name(), module);
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<dyn ProbeModule>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.modules.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
