//! Agents, planning, crew delegation and the coordinator that ties them
//! together.

pub mod agent;
pub mod coordinator;
pub mod crew;
pub mod planner;
pub mod prompts;
pub mod roles;

pub use coordinator::{
    Coordinator, CoordinatorError, ExecutionOutcome, ExecutionRequest, GeneratedTests, Route,
    StreamEvent,
};
pub use crew::{CrewDelegate, CrewError, DisabledCrew, LlmCrew};
pub use planner::{parse_plan, Plan, PlanTask};
