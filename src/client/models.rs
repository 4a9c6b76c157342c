/// Typed Models Module
///
/// Serde structs mirroring the schema registry. Records come back from the
/// engine as JSON objects with camelCase keys; these types are what the
/// delegates deserialize them into. Relation fields stay `None` unless the
/// query included them, and `_count` is only present when relation counts
/// were requested.
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// A record type backed by a registry model.
pub trait Model: DeserializeOwned {
    /// Name of the model in the schema registry.
    const NAME: &'static str;
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::Text(value.as_str().to_string())
            }
        }
    };
}

string_enum!(MemberRole {
    Owner => "OWNER",
    Admin => "ADMIN",
    Member => "MEMBER",
});

string_enum!(Plan {
    Free => "FREE",
    Pro => "PRO",
    Enterprise => "ENTERPRISE",
});

string_enum!(
    /// Interface language of a user.
    Locale {
        En => "EN",
        Es => "ES",
        Fr => "FR",
        De => "DE",
        Pt => "PT",
    }
);

string_enum!(FeedbackType {
    Bug => "BUG",
    Feature => "FEATURE",
    Improvement => "IMPROVEMENT",
    Question => "QUESTION",
    Other => "OTHER",
});

string_enum!(
    /// Triage state of a feedback item.
    FeedbackStatus {
        Open => "OPEN",
        InProgress => "IN_PROGRESS",
        Resolved => "RESOLVED",
        Closed => "CLOSED",
    }
);

string_enum!(Priority {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Urgent => "URGENT",
});

string_enum!(
    /// Where a webhook delivers to.
    WebhookType {
        Discord => "DISCORD",
        Slack => "SLACK",
        Custom => "CUSTOM",
    }
);

/// Relation counts keyed by relation name.
pub type RelationCounts = BTreeMap<String, i64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub locale: Locale,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<Session>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<Account>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memberships: Option<Vec<OrganizationMember>>,
    #[serde(rename = "_count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<RelationCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: String,
    pub active_organization_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

/// A linked sign-in method: an OAuth provider or a password credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub account_id: String,
    pub provider_id: String,
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub id: String,
    pub identifier: String,
    pub token: String,
    pub value: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub api_key: String,
    pub plan: Plan,
    pub logo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<OrganizationMember>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<Vec<Webhook>>,
    #[serde(rename = "_count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<RelationCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub organization_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: WebhookType,
    pub secret: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Box<Organization>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Box<User>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Box<Organization>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<Box<Organization>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vec<Feedback>>,
    #[serde(rename = "_count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<RelationCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub kind: FeedbackType,
    pub status: FeedbackStatus,
    pub priority: Priority,
    pub title: Option<String>,
    pub message: String,
    pub email: Option<String>,
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<JsonValue>,
    pub votes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Box<Project>>,
}

impl Model for User {
    const NAME: &'static str = "User";
}

impl Model for Session {
    const NAME: &'static str = "Session";
}

impl Model for Account {
    const NAME: &'static str = "Account";
}

impl Model for Verification {
    const NAME: &'static str = "Verification";
}

impl Model for Organization {
    const NAME: &'static str = "Organization";
}

impl Model for Webhook {
    const NAME: &'static str = "Webhook";
}

impl Model for OrganizationMember {
    const NAME: &'static str = "OrganizationMember";
}

impl Model for Project {
    const NAME: &'static str = "Project";
}

impl Model for Feedback {
    const NAME: &'static str = "Feedback";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema;
    use serde_json::json;

    fn registry_values(name: &str) -> Vec<&'static str> {
        schema().enum_def(name).unwrap().values.to_vec()
    }

    #[test]
    fn test_enums_match_registry() {
        assert_eq!(
            MemberRole::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("MemberRole")
        );
        assert_eq!(
            Plan::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("Plan")
        );
        assert_eq!(
            Locale::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("Locale")
        );
        assert_eq!(
            FeedbackType::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("FeedbackType")
        );
        assert_eq!(
            FeedbackStatus::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("FeedbackStatus")
        );
        assert_eq!(
            Priority::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("Priority")
        );
        assert_eq!(
            WebhookType::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
            registry_values("WebhookType")
        );
    }

    #[test]
    fn test_enum_serde_uses_stored_names() {
        assert_eq!(serde_json::to_value(FeedbackStatus::InProgress).unwrap(), json!("IN_PROGRESS"));
        let parsed: FeedbackStatus = serde_json::from_value(json!("IN_PROGRESS")).unwrap();
        assert_eq!(parsed, FeedbackStatus::InProgress);
        assert_eq!(Value::from(Priority::Urgent), Value::Text("URGENT".to_string()));
    }

    #[test]
    fn test_model_names_exist_in_registry() {
        for name in [
            User::NAME,
            Session::NAME,
            Account::NAME,
            Verification::NAME,
            Organization::NAME,
            Webhook::NAME,
            OrganizationMember::NAME,
            Project::NAME,
            Feedback::NAME,
        ] {
            assert!(schema().model(name).is_ok(), "{} missing", name);
        }
    }

    #[test]
    fn test_feedback_deserializes_with_relation_and_type_key() {
        let record = json!({
            "id": "f1",
            "projectId": "p1",
            "type": "BUG",
            "status": "OPEN",
            "priority": "HIGH",
            "title": "Login crash",
            "message": "Crashes on submit",
            "email": null,
            "url": null,
            "userAgent": null,
            "metadata": {"browser": "firefox"},
            "votes": 5,
            "createdAt": "2024-01-01T00:00:00.000Z",
            "updatedAt": "2024-01-01T00:00:00.000Z",
            "project": {
                "id": "p1",
                "organizationId": "o1",
                "name": "Web",
                "slug": "web",
                "description": null,
                "createdAt": "2024-01-01T00:00:00.000Z",
                "updatedAt": "2024-01-01T00:00:00.000Z",
                "_count": {"feedback": 3}
            }
        });
        let feedback: Feedback = serde_json::from_value(record).unwrap();
        assert_eq!(feedback.kind, FeedbackType::Bug);
        assert_eq!(feedback.metadata, Some(json!({"browser": "firefox"})));
        let project = feedback.project.unwrap();
        assert_eq!(project.slug, "web");
        assert_eq!(project.count.unwrap()["feedback"], 3);
        assert!(project.feedback.is_none());
    }
}
