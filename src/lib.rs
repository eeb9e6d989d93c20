// Library exports for fe-parallelizer.
//
// The parallelizer turns a distributed physical plan (a tree of
// fragments connected by exchanges) into concrete plan fragments with
// assigned execution endpoints, ready to dispatch to worker nodes.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod observer;
pub mod plan;
pub mod planner;
pub mod wire;
pub mod workunit;

// Re-export commonly used types.
pub use config::ParallelizeOptions;
pub use endpoint::{ExecutionNodeMap, NodeEndpoint};
pub use error::{PlannerError, Result};
pub use observer::{NoopObserver, PlanObserver};
pub use plan::{
    DistributionAffinity, ExchangeKind, FragmentTree, FunctionLookup, MinorFragmentEndpoint,
    NoopFunctions, PhysicalOperator, ScanSplit,
};
pub use planner::{Parallelizer, PlanningSet};
pub use wire::{FragmentCodec, PlanWriter};
pub use workunit::{
    Collector, FragmentHandle, PlanFragment, QueryContextInfo, SessionIdentity, SessionOption,
};
