pub mod matchmaker;
pub mod policy;
pub mod types;

pub use matchmaker::{Matchmaker, MatchmakerClient};
pub use policy::{PolicyManagerClient, PolicyNotifier};
pub use types::{Action, MatchmakerResponse, Notification};
