// hlsc — HLS basic-block scheduler
//
// Library root. Phases in pipeline order: ir validation, subscript analysis,
// list scheduling, verification; timing renders the result.

pub mod config;
pub mod diag;
pub mod events;
pub mod id;
pub mod ir;
pub mod pass;
pub mod pipeline;
pub mod registry;
pub mod resource;
pub mod schedule;
pub mod subscript;
pub mod timing;
