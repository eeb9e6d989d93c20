pub mod assignment;
pub mod dependency;
pub mod emitter;
pub mod materializer;
pub mod parallelizer;
pub mod planning_set;
pub mod stats;
pub mod width;

pub use parallelizer::Parallelizer;
pub use planning_set::{PlanningSet, Wrapper, WrapperId, WrapperState};
pub use stats::FragmentStats;
