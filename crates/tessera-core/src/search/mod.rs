//! Faceted search over the catalog.
//!
//! - **options**: the request (flag sets, text, resolution, aspect, order, paging)
//! - **planner**: validation and SQL plan construction

pub mod options;
pub mod planner;

pub use options::{AspectBucket, Direction, Order, ResolutionFilter, ResolutionMode, SearchOptions};
pub use planner::{OrderBasis, QueryPlan, QueryPlanner};
