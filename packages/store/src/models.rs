//! # Domain records for the ClientHub marketplace
//!
//! Typed views of the backend-persisted collections. This layer does not own
//! storage; every struct here mirrors a row shape the hosted backend returns
//! as JSON, and crosses the [`crate::DataBackend`] boundary through
//! `serde_json::Value`.
//!
//! ## Records
//!
//! | Struct | Collection | Notes |
//! |--------|------------|-------|
//! | [`Profile`] | `profiles` | One per identity, keyed by the auth user id. Created lazily on first login if absent. |
//! | [`Project`] | `projects` | Owned by a client. Status transitions are not guarded by this layer. |
//! | [`Milestone`] | `milestones` | Per-project payment/delivery checkpoints, ordered by `order_index`. |
//! | [`Proposal`] | `proposals` | A freelancer's bid on a project. |
//! | [`Message`] | `messages` | Direct or project-scoped; conversation identity is derived at read time, never persisted. |
//! | [`Invoice`] | `invoices` | Flat record keyed to a project/user pair. |
//! | [`Review`] | `reviews` | Reviewer/reviewee pair with a 1–5 rating. |
//! | [`Notification`] | `notifications` | Per-user feed entries with a read flag. |
//! | [`ProjectMember`] | `project_members` | Links an engaged freelancer to a project. |
//!
//! ## Identity types
//!
//! [`AuthUser`] and [`AuthSession`] represent the authenticated principal as
//! handed out by the auth subsystem. They are ephemeral per login and carry
//! the sign-up metadata ([`UserMetadata`]) used to synthesize a fallback
//! [`Profile`] before the persisted record has been fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known collection names on the hosted backend.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const PROJECTS: &str = "projects";
    pub const MILESTONES: &str = "milestones";
    pub const PROPOSALS: &str = "proposals";
    pub const MESSAGES: &str = "messages";
    pub const INVOICES: &str = "invoices";
    pub const REVIEWS: &str = "reviews";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const PROJECT_MEMBERS: &str = "project_members";
}

/// A record with a stable identity key, used for merge/de-duplication.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Account role, fixed at sign-up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Freelancer,
    Client,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Freelancer => "freelancer",
            Role::Client => "client",
            Role::Admin => "admin",
        }
    }
}

/// Presence indicator shown next to a profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Online,
    Busy,
    #[default]
    Offline,
}

/// The application-level user record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub role: Role,
    pub full_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub banner_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub availability_status: Availability,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub portfolio_url: Option<String>,
    /// Sum of all ratings received; divide by `total_reviews` for the average.
    #[serde(default)]
    pub total_rating: f64,
    #[serde(default)]
    pub total_reviews: i64,
    #[serde(default)]
    pub total_earnings: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Keyed for Profile {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Profile {
    /// Average rating, 0.0 when no reviews exist.
    pub fn average_rating(&self) -> f64 {
        if self.total_reviews > 0 {
            self.total_rating / self.total_reviews as f64
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Draft,
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Open => "open",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }
}

/// A client's job posting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Keyed for Project {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A payment/delivery checkpoint within a project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for Milestone {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Expired => "expired",
        }
    }
}

/// A freelancer's bid against an open project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub project_id: String,
    pub freelancer_id: String,
    pub budget: f64,
    pub timeline: String,
    pub cover_letter: String,
    #[serde(default)]
    pub status: ProposalStatus,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Keyed for Proposal {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A direct or project-scoped message.
///
/// Conversation identity is derived at read time (`project_id` if present,
/// otherwise the counterpart user id); it is a client-side grouping only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for Message {
    fn key(&self) -> &str {
        &self.id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// A billing record between a client and a freelancer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub milestone_id: Option<String>,
    pub client_id: String,
    pub freelancer_id: String,
    pub amount: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub service_charge: f64,
    pub total_amount: f64,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for Invoice {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A rating left by one party about the other after a project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub project_id: String,
    pub reviewer_id: String,
    pub reviewee_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for Review {
    fn key(&self) -> &str {
        &self.id
    }
}

/// A per-user feed entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    /// Free-form category string, e.g. `"proposal"` or `"payment"`.
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Keyed for Notification {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Membership row linking an engaged freelancer to a project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_id: String,
    pub freelancer_id: String,
}

/// Metadata attached to an identity at sign-up time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// The authenticated principal as reported by the auth subsystem.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// A live session handle: the user plus their access token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: AuthUser,
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}
