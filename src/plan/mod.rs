pub mod fragment;
pub mod operator;

pub use fragment::{ExchangePair, Fragment, FragmentTree, MajorFragmentId};
pub use operator::{
    DistributionAffinity, ExchangeKind, FunctionLookup, MinorFragmentEndpoint, NoopFunctions,
    ParallelizationDependency, PhysicalOperator, ScanSplit,
};
