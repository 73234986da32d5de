use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPreferences {
    pub preferred_depth: Option<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_goal: String,
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    pub discovered_schemas: Vec<String>,
    pub current_schema: Option<String>,
    pub preferences: SessionPreferences,
}

impl Session {
    pub fn new(user_goal: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4().to_string(),
            user_goal: user_goal.into(),
            context: HashMap::new(),
            created_at: now,
            last_access: now,
            ttl,
            discovered_schemas: Vec::new(),
            current_schema: None,
            preferences: SessionPreferences::default(),
        }
    }

    /// `now - last_access > ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now - self.last_access;
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => age > ttl,
            Err(_) => false,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access = now;
    }

    pub fn record_discovery(&mut self, schema_name: impl Into<String>) {
        let name = schema_name.into();
        if !self.discovered_schemas.contains(&name) {
            self.discovered_schemas.push(name.clone());
        }
        self.current_schema = Some(name);
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl_since_last_access() {
        let mut session = Session::new("explore perf data", Duration::from_secs(60));
        let now = session.last_access;
        assert!(!session.is_expired(now + chrono::Duration::seconds(30)));
        assert!(session.is_expired(now + chrono::Duration::seconds(61)));
        session.touch(now + chrono::Duration::seconds(30));
        assert!(!session.is_expired(now + chrono::Duration::seconds(89)));
    }

    #[test]
    fn record_discovery_dedupes_and_sets_current() {
        let mut session = Session::new("goal", Duration::from_secs(60));
        session.record_discovery("Transaction");
        session.record_discovery("PageView");
        session.record_discovery("Transaction");
        assert_eq!(session.discovered_schemas, vec!["Transaction", "PageView"]);
        assert_eq!(session.current_schema.as_deref(), Some("Transaction"));
    }
}
