mod group;
mod incompliance;
mod job;
mod resource;
mod state;

pub use group::JobGroup;
pub use incompliance::{Incompliance, Subject};
pub use job::{Job, OrchestratorType, PlainManifest, RemediationType, Target};
pub use resource::{Condition, ConditionStatus, Resource};
pub use state::{JobState, JobType, StateMachine, Transition};
