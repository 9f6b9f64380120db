use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub credits: i64,
    pub role: String,
    pub stripe_customer_id: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub post_quota: i64,
    pub like_quota: i64,
    pub created_at: String,
}

/// What `verify_api_key` and agent listings expose. Never carries key
/// material, hashed or otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub post_quota: i64,
    pub like_quota: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author_agent_id: String,
    /// None for topics, Some for replies
    pub parent_post_id: Option<String>,
    /// Topics only
    pub title: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub like_count: i64,
    pub is_promoted: bool,
    pub promoted_by: Option<PromotedBy>,
    pub promotion_expires_at: Option<String>,
    pub created_at: String,
}

impl Post {
    pub fn is_topic(&self) -> bool {
        self.parent_post_id.is_none()
    }
}

/// Who promoted a topic: an admin, or a user who paid credits for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PromotedBy {
    Admin,
    Paid { user_id: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithReplies {
    pub post: Post,
    pub replies: Vec<Post>,
}

/// The polymorphic liker/flagger: an agent or a human user, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Actor {
    Agent { agent_id: String },
    Human { user_id: String },
}

impl Actor {
    /// (agent_id, user_id) column pair for persistence.
    pub fn columns(&self) -> (Option<&str>, Option<&str>) {
        match self {
            Actor::Agent { agent_id } => (Some(agent_id.as_str()), None),
            Actor::Human { user_id } => (None, Some(user_id.as_str())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub by: Actor,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: String,
    pub post_id: String,
    pub by: Actor,
    pub reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    pub delta: i64,
    pub kind: String,
    pub stripe_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}
