//! Emitted work-unit records.
//!
//! A parallelized query is a list of [`PlanFragment`] records, one per
//! (major fragment, minor id) pair, each carrying everything a worker
//! needs to run its slice: identity, placement, memory bounds, the
//! serialized plan and option blobs, credentials and the collector
//! descriptors for its receivers.

use crate::endpoint::NodeEndpoint;
use crate::plan::operator::MinorFragmentEndpoint;
use crate::wire::FragmentCodec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one minor fragment within one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentHandle {
    pub query_id: Uuid,
    pub major_fragment_id: u32,
    pub minor_fragment_id: u32,
}

/// Per-receiver descriptor: which incoming minor fragments to expect
/// and from which endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collector {
    pub opposite_major_id: u32,
    pub is_spooling: bool,
    pub supports_out_of_order: bool,
    pub incoming_minor_fragments: Vec<MinorFragmentEndpoint>,
}

/// Context captured when the query started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryContextInfo {
    pub query_start_ms: i64,
    pub default_schema: String,
    pub priority: i32,
}

/// Credentials of the session that launched the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user: String,
}

/// One session option forwarded to the executor alongside the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOption {
    pub name: String,
    pub value: String,
}

/// The dispatchable unit handed to a worker node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFragment {
    pub handle: FragmentHandle,
    pub foreman: NodeEndpoint,
    pub assignment: NodeEndpoint,
    pub mem_initial: u64,
    pub mem_max: u64,
    pub fragment_bytes: Vec<u8>,
    pub options_bytes: Vec<u8>,
    pub credentials: SessionIdentity,
    pub collectors: Vec<Collector>,
    pub leaf_fragment: bool,
    pub priority: i32,
    pub codec: FragmentCodec,
    pub context: QueryContextInfo,
}
