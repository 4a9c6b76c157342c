/// # Test Utilities Module
///
/// Shared fixtures for unit tests: an in-memory database with the schema
/// pushed, optionally seeded with a small, fixed data set so tests can refer
/// to rows by id.
///
/// Sample data layout:
/// - users `u1` (Alice), `u2` (Bob), `u3` (Carol)
/// - organizations `o1` (acme, PRO) and `o2` (globex, FREE)
/// - members `m1` u1@o1 OWNER, `m2` u2@o1 MEMBER, `m3` u2@o2 ADMIN
/// - projects `p1` web and `p2` mobile in o1, `p3` portal in o2
/// - feedback `f1`..`f6` spread over the projects, created one day apart
use crate::config::IdStrategy;
use crate::core::db::QueryExecutor;
use crate::core::Result;
use crate::engine::Engine;
use crate::schema::ddl;
use rusqlite::Connection;

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub name: String,
    pub connection: Connection,
}

impl DatabaseFixture {
    /// Creates an empty database with every table and index in place.
    pub fn new(name: &str) -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        ddl::push(&connection)?;
        Ok(DatabaseFixture {
            name: name.to_string(),
            connection,
        })
    }

    /// Creates a database populated with the sample data set.
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.populate_sample_data()?;
        Ok(fixture)
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine::new(QueryExecutor::new(&self.connection), IdStrategy::Cuid)
    }

    pub fn count_rows(&self, table: &str) -> i64 {
        self.connection
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| row.get(0))
            .unwrap_or(-1)
    }

    fn populate_sample_data(&self) -> Result<()> {
        self.connection.execute_batch(
            r#"
            INSERT INTO "User" ("id", "name", "email", "emailVerified", "locale") VALUES
                ('u1', 'Alice', 'alice@example.com', 0, 'EN'),
                ('u2', 'Bob', 'bob@example.com', 1, 'ES'),
                ('u3', 'Carol', 'carol@example.com', 0, 'FR');

            INSERT INTO "Session" ("id", "token", "expiresAt", "userId") VALUES
                ('s1', 'tok_1', '2030-01-01T00:00:00.000Z', 'u1');

            INSERT INTO "Account" ("id", "accountId", "providerId", "userId") VALUES
                ('a1', 'gh_1', 'github', 'u1');

            INSERT INTO "Organization" ("id", "name", "slug", "apiKey", "plan") VALUES
                ('o1', 'Acme', 'acme', 'key_acme', 'PRO'),
                ('o2', 'Globex', 'globex', 'key_globex', 'FREE');

            INSERT INTO "OrganizationMember" ("id", "userId", "organizationId", "role") VALUES
                ('m1', 'u1', 'o1', 'OWNER'),
                ('m2', 'u2', 'o1', 'MEMBER'),
                ('m3', 'u2', 'o2', 'ADMIN');

            INSERT INTO "Webhook" ("id", "organizationId", "url", "type", "enabled") VALUES
                ('w1', 'o1', 'https://hooks.slack.com/services/acme', 'SLACK', 1),
                ('w2', 'o1', 'https://discord.com/api/webhooks/acme', 'DISCORD', 0);

            INSERT INTO "Project" ("id", "organizationId", "name", "slug", "description") VALUES
                ('p1', 'o1', 'Web App', 'web', 'Customer facing site'),
                ('p2', 'o1', 'Mobile', 'mobile', NULL),
                ('p3', 'o2', 'Portal', 'portal', NULL);

            INSERT INTO "Feedback"
                ("id", "projectId", "type", "status", "priority", "title", "message", "metadata", "votes", "createdAt", "updatedAt")
            VALUES
                ('f1', 'p1', 'BUG', 'OPEN', 'HIGH', 'Login crash', 'App crashes on login', '{"browser":"firefox"}', 5,
                 '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z'),
                ('f2', 'p1', 'FEATURE', 'OPEN', 'MEDIUM', 'Dark mode', 'Please add dark mode', NULL, 12,
                 '2024-01-02T00:00:00.000Z', '2024-01-02T00:00:00.000Z'),
                ('f3', 'p1', 'BUG', 'RESOLVED', 'LOW', NULL, 'Typo on the 50%_off page', NULL, 1,
                 '2024-01-03T00:00:00.000Z', '2024-01-03T00:00:00.000Z'),
                ('f4', 'p2', 'IMPROVEMENT', 'IN_PROGRESS', 'MEDIUM', 'Faster sync', 'Sync is slow', NULL, 7,
                 '2024-01-04T00:00:00.000Z', '2024-01-04T00:00:00.000Z'),
                ('f5', 'p2', 'QUESTION', 'CLOSED', 'LOW', 'Pricing?', 'How much does PRO cost', NULL, 0,
                 '2024-01-05T00:00:00.000Z', '2024-01-05T00:00:00.000Z'),
                ('f6', 'p3', 'BUG', 'OPEN', 'URGENT', 'Data loss', 'Lost my data', NULL, 3,
                 '2024-01-06T00:00:00.000Z', '2024-01-06T00:00:00.000Z');
            "#,
        )?;
        Ok(())
    }
}

/// Ids of a list of records, in order.
pub fn ids(records: &[crate::engine::Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(String::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_fixture_creation() {
        let fixture = DatabaseFixture::new("test_create").unwrap();
        assert_eq!(fixture.name, "test_create");
        assert_eq!(fixture.count_rows("Feedback"), 0);
    }

    #[test]
    fn test_sample_data_fixture() {
        let fixture = DatabaseFixture::with_sample_data("test_sample").unwrap();
        assert_eq!(fixture.count_rows("User"), 3);
        assert_eq!(fixture.count_rows("Feedback"), 6);
        assert_eq!(fixture.count_rows("OrganizationMember"), 3);
    }
}
