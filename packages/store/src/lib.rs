pub mod backend;
pub mod error;
pub mod gateway;
pub mod live;
pub mod models;
pub mod realtime;
pub mod session;

mod memory;
pub use memory::MemoryBackend;

pub use backend::{
    AuthBackend, AuthEvent, ChangeEvent, ChangeFeed, ChangeKind, DataBackend, Direction, Filter,
    OrderBy, Query, SignUpMetadata, SignUpOutcome,
};
pub use error::{AuthError, StoreError};
pub use gateway::{
    ClientDashboardStats, FreelancerDashboardStats, Gateway, InvoiceWithContext, ProposalForClient,
    ProposalWithProject, ReviewWithContext,
};
pub use live::{conversations, merge_by_id, Conversation, ListState, LiveList};
pub use models::{
    AuthSession, AuthUser, Availability, Invoice, InvoiceStatus, Keyed, Message, Milestone,
    Notification, Profile, Project, ProjectMember, ProjectStatus, Proposal, ProposalStatus, Review,
    Role, UserMetadata,
};
pub use realtime::{Realtime, Subscription};
pub use session::{Session, SessionOptions, SessionState};
