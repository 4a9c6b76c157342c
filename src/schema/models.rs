use super::{DefaultValue, EnumDef, FieldDef, ModelDef, RelationDef, ScalarType, Schema};

use ScalarType::{Boolean, DateTime, Int, Json, String};

pub(super) fn build() -> Schema {
    Schema {
        models: vec![
            user(),
            session(),
            account(),
            verification(),
            organization(),
            webhook(),
            organization_member(),
            project(),
            feedback(),
        ],
        enums: vec![
            EnumDef {
                name: "MemberRole",
                values: &["OWNER", "ADMIN", "MEMBER"],
            },
            EnumDef {
                name: "Plan",
                values: &["FREE", "PRO", "ENTERPRISE"],
            },
            EnumDef {
                name: "Locale",
                values: &["EN", "ES", "FR", "DE", "PT"],
            },
            EnumDef {
                name: "FeedbackType",
                values: &["BUG", "FEATURE", "IMPROVEMENT", "QUESTION", "OTHER"],
            },
            EnumDef {
                name: "FeedbackStatus",
                values: &["OPEN", "IN_PROGRESS", "RESOLVED", "CLOSED"],
            },
            EnumDef {
                name: "Priority",
                values: &["LOW", "MEDIUM", "HIGH", "URGENT"],
            },
            EnumDef {
                name: "WebhookType",
                values: &["DISCORD", "SLACK", "CUSTOM"],
            },
        ],
    }
}

fn user() -> ModelDef {
    ModelDef {
        name: "User",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("name", String),
            FieldDef::new("email", String).unique(),
            FieldDef::new("emailVerified", Boolean).default_to(DefaultValue::Bool(false)),
            FieldDef::new("image", String).optional(),
            FieldDef::new("locale", ScalarType::Enum("Locale")).default_to(DefaultValue::Enum("EN")),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![
            RelationDef::to_many("sessions", "Session", "user"),
            RelationDef::to_many("accounts", "Account", "user"),
            RelationDef::to_many("memberships", "OrganizationMember", "user"),
        ],
        compound_uniques: vec![],
    }
}

fn session() -> ModelDef {
    ModelDef {
        name: "Session",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("token", String).unique(),
            FieldDef::new("expiresAt", DateTime),
            FieldDef::new("ipAddress", String).optional(),
            FieldDef::new("userAgent", String).optional(),
            FieldDef::new("userId", String),
            FieldDef::new("activeOrganizationId", String).optional(),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![RelationDef::to_one("user", "User", &["userId"], &["id"])],
        compound_uniques: vec![],
    }
}

fn account() -> ModelDef {
    ModelDef {
        name: "Account",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("accountId", String),
            FieldDef::new("providerId", String),
            FieldDef::new("userId", String),
            FieldDef::new("accessToken", String).optional(),
            FieldDef::new("refreshToken", String).optional(),
            FieldDef::new("idToken", String).optional(),
            FieldDef::new("accessTokenExpiresAt", DateTime).optional(),
            FieldDef::new("refreshTokenExpiresAt", DateTime).optional(),
            FieldDef::new("scope", String).optional(),
            FieldDef::new("password", String).optional(),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![RelationDef::to_one("user", "User", &["userId"], &["id"])],
        compound_uniques: vec![&["providerId", "accountId"][..]],
    }
}

fn verification() -> ModelDef {
    ModelDef {
        name: "Verification",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("identifier", String),
            FieldDef::new("token", String),
            FieldDef::new("value", String).optional(),
            FieldDef::new("expiresAt", DateTime),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![],
        compound_uniques: vec![&["identifier", "token"][..]],
    }
}

fn organization() -> ModelDef {
    ModelDef {
        name: "Organization",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("name", String),
            FieldDef::new("slug", String).unique(),
            FieldDef::new("apiKey", String).unique(),
            FieldDef::new("plan", ScalarType::Enum("Plan")).default_to(DefaultValue::Enum("FREE")),
            FieldDef::new("logo", String).optional(),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![
            RelationDef::to_many("members", "OrganizationMember", "organization"),
            RelationDef::to_many("projects", "Project", "organization"),
            RelationDef::to_many("webhooks", "Webhook", "organization"),
        ],
        compound_uniques: vec![],
    }
}

fn webhook() -> ModelDef {
    ModelDef {
        name: "Webhook",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("organizationId", String),
            FieldDef::new("url", String),
            FieldDef::new("type", ScalarType::Enum("WebhookType")),
            FieldDef::new("secret", String).optional(),
            FieldDef::new("enabled", Boolean).default_to(DefaultValue::Bool(true)),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![RelationDef::to_one(
            "organization",
            "Organization",
            &["organizationId"],
            &["id"],
        )],
        compound_uniques: vec![],
    }
}

fn organization_member() -> ModelDef {
    ModelDef {
        name: "OrganizationMember",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("userId", String),
            FieldDef::new("organizationId", String),
            FieldDef::new("role", ScalarType::Enum("MemberRole"))
                .default_to(DefaultValue::Enum("MEMBER")),
            FieldDef::created_at(),
        ],
        relations: vec![
            RelationDef::to_one("user", "User", &["userId"], &["id"]),
            RelationDef::to_one("organization", "Organization", &["organizationId"], &["id"]),
        ],
        compound_uniques: vec![&["userId", "organizationId"][..]],
    }
}

fn project() -> ModelDef {
    ModelDef {
        name: "Project",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("organizationId", String),
            FieldDef::new("name", String),
            FieldDef::new("slug", String),
            FieldDef::new("description", String).optional(),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![
            RelationDef::to_one("organization", "Organization", &["organizationId"], &["id"]),
            RelationDef::to_many("feedback", "Feedback", "project"),
        ],
        compound_uniques: vec![&["organizationId", "slug"][..]],
    }
}

fn feedback() -> ModelDef {
    ModelDef {
        name: "Feedback",
        fields: vec![
            FieldDef::id(),
            FieldDef::new("projectId", String),
            FieldDef::new("type", ScalarType::Enum("FeedbackType")),
            FieldDef::new("status", ScalarType::Enum("FeedbackStatus"))
                .default_to(DefaultValue::Enum("OPEN")),
            FieldDef::new("priority", ScalarType::Enum("Priority"))
                .default_to(DefaultValue::Enum("MEDIUM")),
            FieldDef::new("title", String).optional(),
            FieldDef::new("message", String),
            FieldDef::new("email", String).optional(),
            FieldDef::new("url", String).optional(),
            FieldDef::new("userAgent", String).optional(),
            FieldDef::new("metadata", Json).optional(),
            FieldDef::new("votes", Int).default_to(DefaultValue::Int(0)),
            FieldDef::created_at(),
            FieldDef::updated_at(),
        ],
        relations: vec![RelationDef::to_one("project", "Project", &["projectId"], &["id"])],
        compound_uniques: vec![],
    }
}
