//! # Remote Data Gateway — typed reads and writes over a [`DataBackend`]
//!
//! [`Gateway`] translates feature-level intents ("projects for this
//! client", "messages between these two users") into backend queries and
//! shapes the results into flat, typed records. It is generic over the
//! backend, so the same call sites run against the hosted service or the
//! in-memory backend.
//!
//! ## Fail-soft reads, fail-loud writes
//!
//! Every read returns a list (possibly empty) or an `Option` and never
//! propagates a backend error: failures are logged and degraded to empty.
//! The UI must never hard-crash on a transient data error. Writes are the
//! opposite — a rejected insert/update comes back as `Err` and the caller
//! owns surfacing and rollback of any optimistic state.
//!
//! The one deliberate exception is [`Gateway::try_profile`], the
//! `Result`-returning profile fetch the session machine uses to tell
//! "record absent" apart from "backend failed" when deciding whether to
//! insert a synthesized profile.
//!
//! ## Shaping
//!
//! List reads order descending by `created_at` with a fixed row cap (no
//! cursor pagination; older rows beyond the cap are invisible). Free-text
//! search is a case-insensitive substring match over title and
//! description. The backend trait is flat, so joined context (project
//! titles, party names) is assembled here with secondary keyed fetches and
//! merged into `*WithContext` records.
//!
//! ## Dashboard aggregation
//!
//! [`client_dashboard_stats`](Gateway::client_dashboard_stats) and
//! [`freelancer_dashboard_stats`](Gateway::freelancer_dashboard_stats)
//! fetch their inputs concurrently and fold the numbers client-side.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::{DataBackend, Filter, Query};
use crate::error::StoreError;
use crate::models::collections::*;
use crate::models::{
    Invoice, InvoiceStatus, Keyed, Message, Milestone, Notification, Profile, Project,
    ProjectMember, ProjectStatus, Proposal, ProposalStatus, Review, Role,
};

/// Typed data access over any [`DataBackend`].
pub struct Gateway<B> {
    backend: Arc<B>,
}

impl<B> Clone for Gateway<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

/// Project context attached to proposals listed for either party.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub budget: Option<f64>,
    pub status: ProjectStatus,
    pub category: Option<String>,
    pub client_id: String,
    pub client_name: Option<String>,
}

impl ProjectSummary {
    fn new(project: &Project, client_name: Option<String>) -> Self {
        Self {
            id: project.id.clone(),
            title: project.title.clone(),
            description: project.description.clone(),
            budget: project.budget,
            status: project.status,
            category: project.category.clone(),
            client_id: project.client_id.clone(),
            client_name,
        }
    }
}

/// A proposal as shown to the freelancer who made it.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalWithProject {
    pub proposal: Proposal,
    pub project: Option<ProjectSummary>,
}

impl Keyed for ProposalWithProject {
    fn key(&self) -> &str {
        &self.proposal.id
    }
}

/// Freelancer context attached to proposals listed for a client.
#[derive(Clone, Debug, PartialEq)]
pub struct FreelancerSummary {
    pub full_name: String,
    pub skills: Vec<String>,
    pub total_rating: f64,
    pub total_reviews: i64,
}

/// A proposal as shown to the client reviewing it.
#[derive(Clone, Debug, PartialEq)]
pub struct ProposalForClient {
    pub proposal: Proposal,
    pub project: Option<ProjectSummary>,
    pub freelancer: Option<FreelancerSummary>,
}

impl Keyed for ProposalForClient {
    fn key(&self) -> &str {
        &self.proposal.id
    }
}

/// An invoice with the names a list view renders next to it.
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceWithContext {
    pub invoice: Invoice,
    pub project_title: Option<String>,
    pub client_name: Option<String>,
    pub freelancer_name: Option<String>,
}

impl Keyed for InvoiceWithContext {
    fn key(&self) -> &str {
        &self.invoice.id
    }
}

/// A review with both party names and the project title attached.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewWithContext {
    pub review: Review,
    pub project_title: Option<String>,
    pub reviewer_name: Option<String>,
    pub reviewee_name: Option<String>,
}

impl Keyed for ReviewWithContext {
    fn key(&self) -> &str {
        &self.review.id
    }
}

/// Aggregates for the client dashboard.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClientDashboardStats {
    pub total_spent: f64,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub total_freelancers: usize,
    pub pending_invoices: usize,
}

/// Aggregates for the freelancer dashboard.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FreelancerDashboardStats {
    pub total_earnings: f64,
    pub active_projects: usize,
    pub completed_projects: usize,
    pub pending_proposals: usize,
    pub average_rating: f64,
    pub total_reviews: i64,
    pub success_rate: u32,
}

fn decode_list<T: DeserializeOwned>(rows: Vec<Value>, collection: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::error!("dropping undecodable {collection} row: {e}");
                None
            }
        })
        .collect()
}

/// Serialize a record for insertion, dropping the empty id and null fields
/// so the backend can apply its own defaults.
fn to_row<T: Serialize>(record: &T) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(record)?;
    if let Some(obj) = value.as_object_mut() {
        if obj.get("id").and_then(Value::as_str).is_some_and(str::is_empty) {
            obj.remove("id");
        }
        obj.retain(|_, v| !v.is_null());
    }
    Ok(value)
}

fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

impl<B: DataBackend> Gateway<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Fail-soft list read: backend errors degrade to an empty list.
    async fn list<T: DeserializeOwned>(&self, collection: &str, query: Query) -> Vec<T> {
        match self.backend.select(collection, query).await {
            Ok(rows) => decode_list(rows, collection),
            Err(e) => {
                tracing::error!("{collection} query failed: {e}");
                Vec::new()
            }
        }
    }

    async fn create<T: Serialize + DeserializeOwned>(
        &self,
        collection: &str,
        record: &T,
    ) -> Result<T, StoreError> {
        let row = self.backend.insert(collection, to_row(record)?).await?;
        Ok(serde_json::from_value(row)?)
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<T, StoreError> {
        let row = self.backend.update(collection, id, patch).await?;
        Ok(serde_json::from_value(row)?)
    }

    // ---- projects ----------------------------------------------------------

    /// Browse projects, optionally narrowed by status and a free-text term
    /// matched against title and description.
    pub async fn projects(
        &self,
        search: Option<&str>,
        status: Option<ProjectStatus>,
    ) -> Vec<Project> {
        let mut filters = Vec::new();
        if let Some(status) = status {
            filters.push(Filter::eq("status", status.as_str()));
        }
        if let Some(term) = search.filter(|t| !t.is_empty()) {
            filters.push(Filter::or(vec![
                Filter::ilike("title", term),
                Filter::ilike("description", term),
            ]));
        }

        let mut query = Query::new().order_desc("created_at").limit(200);
        let filter = if filters.len() > 1 {
            Some(Filter::and(filters))
        } else {
            filters.pop()
        };
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        self.list(PROJECTS, query).await
    }

    pub async fn projects_for_client(&self, client_id: &str) -> Vec<Project> {
        self.list(
            PROJECTS,
            Query::new()
                .filter(Filter::eq("client_id", client_id))
                .order_desc("created_at"),
        )
        .await
    }

    /// Projects the freelancer is engaged on, resolved through the
    /// membership collection.
    pub async fn projects_for_freelancer(&self, freelancer_id: &str) -> Vec<Project> {
        let members: Vec<ProjectMember> = self
            .list(
                PROJECT_MEMBERS,
                Query::new().filter(Filter::eq("freelancer_id", freelancer_id)),
            )
            .await;
        let ids: Vec<String> = members.into_iter().map(|m| m.project_id).collect();
        if ids.is_empty() {
            return Vec::new();
        }
        self.list(
            PROJECTS,
            Query::new()
                .filter(Filter::any_of("id", &ids))
                .order_desc("created_at"),
        )
        .await
    }

    /// Create a project. Leave `id` empty; the backend assigns it.
    pub async fn create_project(&self, project: &Project) -> Result<Project, StoreError> {
        self.create(PROJECTS, project).await
    }

    /// Apply a partial update. No status-transition guard exists here: any
    /// status may be set to any other.
    pub async fn update_project(&self, id: &str, patch: Value) -> Result<Project, StoreError> {
        self.patch(PROJECTS, id, patch).await
    }

    // ---- profiles ----------------------------------------------------------

    /// Single-profile fetch that reports backend failure, so callers can
    /// distinguish "absent" from "unreachable".
    pub async fn try_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let rows = self
            .backend
            .select(PROFILES, Query::new().filter(Filter::eq("id", id)).limit(1))
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Fail-soft profile fetch.
    pub async fn profile(&self, id: &str) -> Option<Profile> {
        match self.try_profile(id).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!("profile fetch failed for {id}: {e}");
                None
            }
        }
    }

    pub async fn freelancers(&self, limit: usize) -> Vec<Profile> {
        self.list(
            PROFILES,
            Query::new()
                .filter(Filter::eq("role", Role::Freelancer.as_str()))
                .limit(limit),
        )
        .await
    }

    pub async fn create_profile(&self, profile: &Profile) -> Result<Profile, StoreError> {
        self.create(PROFILES, profile).await
    }

    pub async fn upsert_profile(&self, profile: &Profile) -> Result<Profile, StoreError> {
        let row = self.backend.upsert(PROFILES, to_row(profile)?).await?;
        Ok(serde_json::from_value(row)?)
    }

    /// Partial profile update stamped with `updated_at`.
    pub async fn update_profile(&self, id: &str, patch: Value) -> Result<Profile, StoreError> {
        let mut patch = patch;
        if let Some(obj) = patch.as_object_mut() {
            obj.insert("updated_at".into(), now_stamp());
        }
        self.patch(PROFILES, id, patch).await
    }

    // ---- messages ----------------------------------------------------------

    /// Every message the user sent or received, newest first.
    pub async fn messages_for_user(&self, user_id: &str) -> Vec<Message> {
        self.list(
            MESSAGES,
            Query::new()
                .filter(Filter::or(vec![
                    Filter::eq("sender_id", user_id),
                    Filter::eq("receiver_id", user_id),
                ]))
                .order_desc("created_at")
                .limit(500),
        )
        .await
    }

    /// The two-party thread, oldest first.
    pub async fn messages_between(&self, user_id: &str, other_id: &str) -> Vec<Message> {
        self.list(
            MESSAGES,
            Query::new()
                .filter(Filter::or(vec![
                    Filter::and(vec![
                        Filter::eq("sender_id", user_id),
                        Filter::eq("receiver_id", other_id),
                    ]),
                    Filter::and(vec![
                        Filter::eq("sender_id", other_id),
                        Filter::eq("receiver_id", user_id),
                    ]),
                ]))
                .order_asc("created_at")
                .limit(1000),
        )
        .await
    }

    pub async fn send_message(&self, message: &Message) -> Result<Message, StoreError> {
        self.create(MESSAGES, message).await
    }

    // ---- proposals ---------------------------------------------------------

    pub async fn proposals_for_project(&self, project_id: &str) -> Vec<Proposal> {
        self.list(
            PROPOSALS,
            Query::new()
                .filter(Filter::eq("project_id", project_id))
                .order_desc("created_at"),
        )
        .await
    }

    pub async fn create_proposal(&self, proposal: &Proposal) -> Result<Proposal, StoreError> {
        self.create(PROPOSALS, proposal).await
    }

    /// Mark accepted. Nothing prevents accepting twice or accepting after a
    /// rejection; status is written as-is.
    pub async fn accept_proposal(&self, id: &str) -> Result<Proposal, StoreError> {
        self.patch(
            PROPOSALS,
            id,
            serde_json::json!({"status": ProposalStatus::Accepted.as_str()}),
        )
        .await
    }

    pub async fn reject_proposal(&self, id: &str) -> Result<Proposal, StoreError> {
        self.patch(
            PROPOSALS,
            id,
            serde_json::json!({"status": ProposalStatus::Rejected.as_str()}),
        )
        .await
    }

    async fn proposals_raw_for_freelancer(&self, freelancer_id: &str) -> Vec<Proposal> {
        self.list(
            PROPOSALS,
            Query::new()
                .filter(Filter::eq("freelancer_id", freelancer_id))
                .order_desc("created_at"),
        )
        .await
    }

    /// The freelancer's proposals with project and client context attached.
    pub async fn proposals_for_freelancer(&self, freelancer_id: &str) -> Vec<ProposalWithProject> {
        let proposals = self.proposals_raw_for_freelancer(freelancer_id).await;

        let project_ids: Vec<String> = unique(proposals.iter().map(|p| p.project_id.clone()));
        let projects = self.projects_by_ids(&project_ids).await;
        let client_ids: Vec<String> = unique(projects.values().map(|p| p.client_id.clone()));
        let clients = self.profiles_by_ids(&client_ids).await;

        proposals
            .into_iter()
            .map(|proposal| {
                let project = projects.get(&proposal.project_id).map(|p| {
                    let client_name = clients.get(&p.client_id).map(|c| c.full_name.clone());
                    ProjectSummary::new(p, client_name)
                });
                ProposalWithProject { proposal, project }
            })
            .collect()
    }

    /// Proposals received across the client's projects, with freelancer
    /// context attached.
    pub async fn proposals_for_client(&self, client_id: &str) -> Vec<ProposalForClient> {
        let projects = self.projects_for_client(client_id).await;
        let project_ids: Vec<String> = projects.iter().map(|p| p.id.clone()).collect();
        if project_ids.is_empty() {
            return Vec::new();
        }
        let by_project: HashMap<String, Project> =
            projects.into_iter().map(|p| (p.id.clone(), p)).collect();

        let proposals: Vec<Proposal> = self
            .list(
                PROPOSALS,
                Query::new()
                    .filter(Filter::any_of("project_id", &project_ids))
                    .order_desc("created_at"),
            )
            .await;

        let freelancer_ids: Vec<String> =
            unique(proposals.iter().map(|p| p.freelancer_id.clone()));
        let freelancers = self.profiles_by_ids(&freelancer_ids).await;

        proposals
            .into_iter()
            .map(|proposal| {
                let project = by_project
                    .get(&proposal.project_id)
                    .map(|p| ProjectSummary::new(p, None));
                let freelancer = freelancers.get(&proposal.freelancer_id).map(|f| {
                    FreelancerSummary {
                        full_name: f.full_name.clone(),
                        skills: f.skills.clone(),
                        total_rating: f.total_rating,
                        total_reviews: f.total_reviews,
                    }
                });
                ProposalForClient {
                    proposal,
                    project,
                    freelancer,
                }
            })
            .collect()
    }

    // ---- invoices ----------------------------------------------------------

    pub async fn create_invoice(&self, invoice: &Invoice) -> Result<Invoice, StoreError> {
        self.create(INVOICES, invoice).await
    }

    async fn invoices_raw_for_user(&self, user_id: &str) -> Vec<Invoice> {
        self.list(
            INVOICES,
            Query::new()
                .filter(Filter::or(vec![
                    Filter::eq("client_id", user_id),
                    Filter::eq("freelancer_id", user_id),
                ]))
                .order_desc("created_at"),
        )
        .await
    }

    /// Invoices where the user is either party, with names and project
    /// title attached.
    pub async fn invoices_for_user(&self, user_id: &str) -> Vec<InvoiceWithContext> {
        let invoices = self.invoices_raw_for_user(user_id).await;

        let project_ids: Vec<String> = unique(invoices.iter().map(|i| i.project_id.clone()));
        let projects = self.projects_by_ids(&project_ids).await;
        let party_ids: Vec<String> = unique(
            invoices
                .iter()
                .flat_map(|i| [i.client_id.clone(), i.freelancer_id.clone()]),
        );
        let parties = self.profiles_by_ids(&party_ids).await;

        invoices
            .into_iter()
            .map(|invoice| {
                let project_title = projects.get(&invoice.project_id).map(|p| p.title.clone());
                let client_name = parties.get(&invoice.client_id).map(|p| p.full_name.clone());
                let freelancer_name = parties
                    .get(&invoice.freelancer_id)
                    .map(|p| p.full_name.clone());
                InvoiceWithContext {
                    invoice,
                    project_title,
                    client_name,
                    freelancer_name,
                }
            })
            .collect()
    }

    // ---- reviews -----------------------------------------------------------

    /// Reviews written by or about the user, with both names attached.
    pub async fn reviews_for_user(&self, user_id: &str) -> Vec<ReviewWithContext> {
        let reviews: Vec<Review> = self
            .list(
                REVIEWS,
                Query::new()
                    .filter(Filter::or(vec![
                        Filter::eq("reviewer_id", user_id),
                        Filter::eq("reviewee_id", user_id),
                    ]))
                    .order_desc("created_at"),
            )
            .await;

        let project_ids: Vec<String> = unique(reviews.iter().map(|r| r.project_id.clone()));
        let projects = self.projects_by_ids(&project_ids).await;
        let party_ids: Vec<String> = unique(
            reviews
                .iter()
                .flat_map(|r| [r.reviewer_id.clone(), r.reviewee_id.clone()]),
        );
        let parties = self.profiles_by_ids(&party_ids).await;

        reviews
            .into_iter()
            .map(|review| {
                let project_title = projects.get(&review.project_id).map(|p| p.title.clone());
                let reviewer_name = parties.get(&review.reviewer_id).map(|p| p.full_name.clone());
                let reviewee_name = parties.get(&review.reviewee_id).map(|p| p.full_name.clone());
                ReviewWithContext {
                    review,
                    project_title,
                    reviewer_name,
                    reviewee_name,
                }
            })
            .collect()
    }

    // ---- notifications -----------------------------------------------------

    pub async fn notifications_for_user(&self, user_id: &str) -> Vec<Notification> {
        self.list(
            NOTIFICATIONS,
            Query::new()
                .filter(Filter::eq("user_id", user_id))
                .order_desc("created_at")
                .limit(100),
        )
        .await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<Notification, StoreError> {
        self.patch(
            NOTIFICATIONS,
            id,
            serde_json::json!({"is_read": true, "read_at": now_stamp()}),
        )
        .await
    }

    // ---- milestones --------------------------------------------------------

    pub async fn milestones_for_project(&self, project_id: &str) -> Vec<Milestone> {
        self.list(
            MILESTONES,
            Query::new()
                .filter(Filter::eq("project_id", project_id))
                .order_asc("order_index"),
        )
        .await
    }

    pub async fn create_milestone(&self, milestone: &Milestone) -> Result<Milestone, StoreError> {
        self.create(MILESTONES, milestone).await
    }

    pub async fn complete_milestone(&self, id: &str) -> Result<Milestone, StoreError> {
        self.patch(
            MILESTONES,
            id,
            serde_json::json!({"is_completed": true, "completed_at": now_stamp()}),
        )
        .await
    }

    // ---- dashboards --------------------------------------------------------

    pub async fn client_dashboard_stats(&self, client_id: &str) -> ClientDashboardStats {
        let (projects, invoices) = tokio::join!(
            self.projects_for_client(client_id),
            self.invoices_raw_for_user(client_id),
        );

        let project_ids: Vec<String> = projects.iter().map(|p| p.id.clone()).collect();
        let members: Vec<ProjectMember> = if project_ids.is_empty() {
            Vec::new()
        } else {
            self.list(
                PROJECT_MEMBERS,
                Query::new().filter(Filter::any_of("project_id", &project_ids)),
            )
            .await
        };
        let total_freelancers = members
            .iter()
            .map(|m| m.freelancer_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        ClientDashboardStats {
            total_spent: invoices
                .iter()
                .filter(|i| i.status == InvoiceStatus::Paid)
                .map(|i| i.total_amount)
                .sum(),
            active_projects: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::InProgress)
                .count(),
            completed_projects: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::Completed)
                .count(),
            total_freelancers,
            pending_invoices: invoices
                .iter()
                .filter(|i| matches!(i.status, InvoiceStatus::Pending | InvoiceStatus::Overdue))
                .count(),
        }
    }

    pub async fn freelancer_dashboard_stats(&self, freelancer_id: &str) -> FreelancerDashboardStats {
        let (projects, proposals, profile) = tokio::join!(
            self.projects_for_freelancer(freelancer_id),
            self.proposals_raw_for_freelancer(freelancer_id),
            self.profile(freelancer_id),
        );

        let completed = projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Completed)
            .count();
        let success_rate = if projects.is_empty() {
            0
        } else {
            ((completed as f64 / projects.len() as f64) * 100.0).round() as u32
        };

        FreelancerDashboardStats {
            total_earnings: profile.as_ref().map(|p| p.total_earnings).unwrap_or(0.0),
            active_projects: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::InProgress)
                .count(),
            completed_projects: completed,
            pending_proposals: proposals
                .iter()
                .filter(|p| p.status == ProposalStatus::Pending)
                .count(),
            average_rating: profile.as_ref().map(Profile::average_rating).unwrap_or(0.0),
            total_reviews: profile.as_ref().map(|p| p.total_reviews).unwrap_or(0),
            success_rate,
        }
    }

    // ---- join helpers ------------------------------------------------------

    async fn projects_by_ids(&self, ids: &[String]) -> HashMap<String, Project> {
        if ids.is_empty() {
            return HashMap::new();
        }
        let projects: Vec<Project> = self
            .list(PROJECTS, Query::new().filter(Filter::any_of("id", ids)))
            .await;
        projects.into_iter().map(|p| (p.id.clone(), p)).collect()
    }

    async fn profiles_by_ids(&self, ids: &[String]) -> HashMap<String, Profile> {
        if ids.is_empty() {
            return HashMap::new();
        }
        let profiles: Vec<Profile> = self
            .list(PROFILES, Query::new().filter(Filter::any_of("id", ids)))
            .await;
        profiles.into_iter().map(|p| (p.id.clone(), p)).collect()
    }
}

fn unique(ids: impl Iterator<Item = String>) -> Vec<String> {
    ids.collect::<BTreeSet<String>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;

    /// Backend double that refuses everything.
    struct BrokenBackend;

    impl DataBackend for BrokenBackend {
        async fn select(&self, _c: &str, _q: Query) -> Result<Vec<Value>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn insert(&self, _c: &str, _row: Value) -> Result<Value, StoreError> {
            Err(StoreError::Rejected("constraint violation".into()))
        }

        async fn update(&self, _c: &str, _id: &str, _p: Value) -> Result<Value, StoreError> {
            Err(StoreError::Rejected("constraint violation".into()))
        }

        async fn upsert(&self, _c: &str, _row: Value) -> Result<Value, StoreError> {
            Err(StoreError::Rejected("constraint violation".into()))
        }

        async fn delete(&self, _c: &str, _f: Filter) -> Result<(), StoreError> {
            Err(StoreError::Rejected("constraint violation".into()))
        }
    }

    fn project(title: &str, client: &str, status: &str) -> Value {
        json!({
            "client_id": client,
            "title": title,
            "description": format!("{title} description"),
            "status": status,
        })
    }

    async fn seed(backend: &MemoryBackend, collection: &str, rows: Vec<Value>) {
        for row in rows {
            backend.insert(collection, row).await.unwrap();
        }
    }

    #[tokio::test]
    async fn reads_fail_soft_and_writes_fail_loud() {
        let gateway = Gateway::new(BrokenBackend);

        // reads degrade to empty, never error
        assert!(gateway.projects(None, None).await.is_empty());
        assert!(gateway.messages_for_user("u1").await.is_empty());
        assert!(gateway.profile("u1").await.is_none());
        assert!(gateway.notifications_for_user("u1").await.is_empty());

        // writes surface the rejection
        let project = Project {
            client_id: "c1".into(),
            title: "Logo".into(),
            description: "d".into(),
            ..Project::default()
        };
        assert!(matches!(
            gateway.create_project(&project).await,
            Err(StoreError::Rejected(_))
        ));
        assert!(matches!(
            gateway.update_project("p1", json!({"status": "open"})).await,
            Err(StoreError::Rejected(_))
        ));

        // the strict profile fetch is the exception: it reports the failure
        assert!(gateway.try_profile("u1").await.is_err());
    }

    #[tokio::test]
    async fn project_search_matches_title_and_description() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROJECTS,
            vec![
                project("Landing page", "c1", "open"),
                project("Logo refresh", "c1", "open"),
                json!({
                    "client_id": "c2",
                    "title": "Misc",
                    "description": "needs a new LANDING flow",
                    "status": "draft",
                }),
            ],
        )
        .await;
        let gateway = Gateway::new(backend);

        let hits = gateway.projects(Some("landing"), None).await;
        assert_eq!(hits.len(), 2);

        let open_hits = gateway
            .projects(Some("landing"), Some(ProjectStatus::Open))
            .await;
        assert_eq!(open_hits.len(), 1);
        assert_eq!(open_hits[0].title, "Landing page");
    }

    #[tokio::test]
    async fn status_updates_skip_transitions_without_complaint() {
        let backend = MemoryBackend::new();
        let gateway = Gateway::new(backend);

        let created = gateway
            .create_project(&Project {
                client_id: "c1".into(),
                title: "Site".into(),
                description: "d".into(),
                status: ProjectStatus::Draft,
                ..Project::default()
            })
            .await
            .unwrap();
        assert_eq!(created.status, ProjectStatus::Draft);

        // draft -> completed directly; no guard rejects the skip
        let updated = gateway
            .update_project(&created.id, json!({"status": "completed"}))
            .await
            .unwrap();
        assert_eq!(updated.status, ProjectStatus::Completed);
    }

    #[tokio::test]
    async fn messages_between_is_scoped_and_oldest_first() {
        let backend = MemoryBackend::new();
        let gateway = Gateway::new(backend);

        for (sender, receiver, content) in
            [("a", "b", "first"), ("b", "a", "second"), ("a", "c", "other")]
        {
            gateway
                .send_message(&Message {
                    sender_id: sender.into(),
                    receiver_id: Some(receiver.into()),
                    content: content.into(),
                    ..Message::default()
                })
                .await
                .unwrap();
        }

        let thread = gateway.messages_between("a", "b").await;
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "first");
        assert_eq!(thread[1].content, "second");

        let all = gateway.messages_for_user("a").await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn freelancer_proposals_carry_project_and_client_context() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROFILES,
            vec![json!({"id": "c1", "full_name": "Acme Inc", "role": "client"})],
        )
        .await;
        seed(
            &backend,
            PROJECTS,
            vec![json!({
                "id": "p1",
                "client_id": "c1",
                "title": "Dashboard",
                "description": "d",
                "status": "open",
            })],
        )
        .await;
        let gateway = Gateway::new(backend);

        gateway
            .create_proposal(&Proposal {
                project_id: "p1".into(),
                freelancer_id: "f1".into(),
                budget: 900.0,
                timeline: "2 weeks".into(),
                cover_letter: "hi".into(),
                ..Proposal::default()
            })
            .await
            .unwrap();

        let listed = gateway.proposals_for_freelancer("f1").await;
        assert_eq!(listed.len(), 1);
        let project = listed[0].project.as_ref().unwrap();
        assert_eq!(project.title, "Dashboard");
        assert_eq!(project.client_name.as_deref(), Some("Acme Inc"));
    }

    #[tokio::test]
    async fn client_proposals_carry_freelancer_context() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROFILES,
            vec![json!({
                "id": "f1",
                "full_name": "Ada",
                "role": "freelancer",
                "skills": ["rust", "sql"],
                "total_rating": 9.0,
                "total_reviews": 2,
            })],
        )
        .await;
        seed(
            &backend,
            PROJECTS,
            vec![json!({
                "id": "p1",
                "client_id": "c1",
                "title": "Dashboard",
                "description": "d",
                "status": "open",
            })],
        )
        .await;
        seed(
            &backend,
            PROPOSALS,
            vec![json!({
                "project_id": "p1",
                "freelancer_id": "f1",
                "budget": 500.0,
                "timeline": "1 week",
                "cover_letter": "hello",
                "status": "pending",
            })],
        )
        .await;
        let gateway = Gateway::new(backend);

        let listed = gateway.proposals_for_client("c1").await;
        assert_eq!(listed.len(), 1);
        let freelancer = listed[0].freelancer.as_ref().unwrap();
        assert_eq!(freelancer.full_name, "Ada");
        assert_eq!(freelancer.skills, vec!["rust", "sql"]);

        // accepting twice is not guarded
        let id = listed[0].proposal.id.clone();
        assert_eq!(
            gateway.accept_proposal(&id).await.unwrap().status,
            ProposalStatus::Accepted
        );
        assert_eq!(
            gateway.accept_proposal(&id).await.unwrap().status,
            ProposalStatus::Accepted
        );
        assert_eq!(
            gateway.reject_proposal(&id).await.unwrap().status,
            ProposalStatus::Rejected
        );
    }

    #[tokio::test]
    async fn invoice_and_review_lists_join_names() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROFILES,
            vec![
                json!({"id": "c1", "full_name": "Acme Inc", "role": "client"}),
                json!({"id": "f1", "full_name": "Ada", "role": "freelancer"}),
            ],
        )
        .await;
        seed(
            &backend,
            PROJECTS,
            vec![json!({
                "id": "p1",
                "client_id": "c1",
                "title": "Dashboard",
                "description": "d",
                "status": "completed",
            })],
        )
        .await;
        seed(
            &backend,
            REVIEWS,
            vec![json!({
                "project_id": "p1",
                "reviewer_id": "c1",
                "reviewee_id": "f1",
                "rating": 5,
                "comment": "great",
            })],
        )
        .await;
        let gateway = Gateway::new(backend);

        gateway
            .create_invoice(&Invoice {
                project_id: "p1".into(),
                client_id: "c1".into(),
                freelancer_id: "f1".into(),
                amount: 100.0,
                total_amount: 118.0,
                status: InvoiceStatus::Pending,
                ..Invoice::default()
            })
            .await
            .unwrap();

        let invoices = gateway.invoices_for_user("f1").await;
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].project_title.as_deref(), Some("Dashboard"));
        assert_eq!(invoices[0].client_name.as_deref(), Some("Acme Inc"));
        assert_eq!(invoices[0].freelancer_name.as_deref(), Some("Ada"));

        let reviews = gateway.reviews_for_user("f1").await;
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].reviewer_name.as_deref(), Some("Acme Inc"));
        assert_eq!(reviews[0].reviewee_name.as_deref(), Some("Ada"));
        assert_eq!(reviews[0].project_title.as_deref(), Some("Dashboard"));
    }

    #[tokio::test]
    async fn notifications_mark_read_sets_flag_and_timestamp() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            NOTIFICATIONS,
            vec![json!({"user_id": "u1", "title": "t", "message": "m", "is_read": false})],
        )
        .await;
        let gateway = Gateway::new(backend);

        let listed = gateway.notifications_for_user("u1").await;
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_read);

        let updated = gateway.mark_notification_read(&listed[0].id).await.unwrap();
        assert!(updated.is_read);
        assert!(updated.read_at.is_some());
    }

    #[tokio::test]
    async fn milestones_order_by_index_and_complete() {
        let backend = MemoryBackend::new();
        let gateway = Gateway::new(backend);

        for (title, index) in [("Ship", 2), ("Design", 0), ("Build", 1)] {
            gateway
                .create_milestone(&Milestone {
                    project_id: "p1".into(),
                    title: title.into(),
                    order_index: index,
                    ..Milestone::default()
                })
                .await
                .unwrap();
        }

        let milestones = gateway.milestones_for_project("p1").await;
        let titles: Vec<&str> = milestones.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Design", "Build", "Ship"]);

        let done = gateway
            .complete_milestone(&milestones[0].id)
            .await
            .unwrap();
        assert!(done.is_completed);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn client_dashboard_folds_projects_invoices_and_members() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROJECTS,
            vec![
                json!({"id": "p1", "client_id": "c1", "title": "A", "description": "", "status": "in_progress"}),
                json!({"id": "p2", "client_id": "c1", "title": "B", "description": "", "status": "completed"}),
                json!({"id": "p3", "client_id": "c1", "title": "C", "description": "", "status": "completed"}),
            ],
        )
        .await;
        seed(
            &backend,
            PROJECT_MEMBERS,
            vec![
                json!({"project_id": "p1", "freelancer_id": "f1"}),
                json!({"project_id": "p2", "freelancer_id": "f1"}),
                json!({"project_id": "p3", "freelancer_id": "f2"}),
            ],
        )
        .await;
        seed(
            &backend,
            INVOICES,
            vec![
                json!({"project_id": "p2", "client_id": "c1", "freelancer_id": "f1", "amount": 100.0, "total_amount": 110.0, "status": "paid"}),
                json!({"project_id": "p3", "client_id": "c1", "freelancer_id": "f2", "amount": 200.0, "total_amount": 220.0, "status": "paid"}),
                json!({"project_id": "p1", "client_id": "c1", "freelancer_id": "f1", "amount": 50.0, "total_amount": 55.0, "status": "pending"}),
                json!({"project_id": "p1", "client_id": "c1", "freelancer_id": "f1", "amount": 60.0, "total_amount": 66.0, "status": "overdue"}),
            ],
        )
        .await;
        let gateway = Gateway::new(backend);

        let stats = gateway.client_dashboard_stats("c1").await;
        assert_eq!(stats.total_spent, 330.0);
        assert_eq!(stats.active_projects, 1);
        assert_eq!(stats.completed_projects, 2);
        assert_eq!(stats.total_freelancers, 2);
        assert_eq!(stats.pending_invoices, 2);
    }

    #[tokio::test]
    async fn freelancer_dashboard_folds_membership_and_profile_aggregates() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROFILES,
            vec![json!({
                "id": "f1",
                "full_name": "Ada",
                "role": "freelancer",
                "total_earnings": 1500.0,
                "total_rating": 9.0,
                "total_reviews": 2,
            })],
        )
        .await;
        seed(
            &backend,
            PROJECTS,
            vec![
                json!({"id": "p1", "client_id": "c1", "title": "A", "description": "", "status": "completed"}),
                json!({"id": "p2", "client_id": "c1", "title": "B", "description": "", "status": "in_progress"}),
            ],
        )
        .await;
        seed(
            &backend,
            PROJECT_MEMBERS,
            vec![
                json!({"project_id": "p1", "freelancer_id": "f1"}),
                json!({"project_id": "p2", "freelancer_id": "f1"}),
            ],
        )
        .await;
        seed(
            &backend,
            PROPOSALS,
            vec![
                json!({"project_id": "p9", "freelancer_id": "f1", "budget": 1.0, "timeline": "", "cover_letter": "", "status": "pending"}),
                json!({"project_id": "p8", "freelancer_id": "f1", "budget": 1.0, "timeline": "", "cover_letter": "", "status": "rejected"}),
            ],
        )
        .await;
        let gateway = Gateway::new(backend);

        let stats = gateway.freelancer_dashboard_stats("f1").await;
        assert_eq!(stats.total_earnings, 1500.0);
        assert_eq!(stats.active_projects, 1);
        assert_eq!(stats.completed_projects, 1);
        assert_eq!(stats.pending_proposals, 1);
        assert_eq!(stats.average_rating, 4.5);
        assert_eq!(stats.total_reviews, 2);
        assert_eq!(stats.success_rate, 50);
    }

    #[tokio::test]
    async fn update_profile_stamps_updated_at() {
        let backend = MemoryBackend::new();
        seed(
            &backend,
            PROFILES,
            vec![json!({"id": "u1", "full_name": "Ada", "role": "freelancer"})],
        )
        .await;
        let gateway = Gateway::new(backend);

        let updated = gateway
            .update_profile("u1", json!({"bio": "hello"}))
            .await
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("hello"));
        assert!(updated.updated_at.is_some());
    }
}
