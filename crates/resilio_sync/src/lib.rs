//! Client-side session agents for the incident service.
//!
//! Each connected session owns one [`SyncAgent`] scoped to its role. Agents apply user intents
//! optimistically, then reconcile against the server's responses and the live feed.

pub mod agent;
pub mod dashboard;
pub mod field_unit;
pub mod notice;
pub mod reconcile;

pub use agent::{PendingRequest, RoleScope, SyncAgent};
pub use dashboard::{DashboardAgent, DashboardScope};
pub use field_unit::{FieldUnitAgent, FieldUnitScope};
pub use notice::{Notice, NoticeKind};
pub use reconcile::{Settlement, Ticket, Tracked};
