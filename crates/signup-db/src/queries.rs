use chrono::Utc;
use rusqlite::types::Value;

use signup_types::models::{Event, EventSummary, Registration};
use signup_types::slug::slugify;

use crate::error::DbError;
use crate::rows::{FromRecord, Record, RowSet};
use crate::update::{EventColumn, FieldValue, RegistrationColumn, Updated};
use crate::Database;

impl FromRecord for Event {
    fn from_record(record: &Record<'_>) -> Result<Self, DbError> {
        Ok(Event {
            id: record.get("id")?,
            name: record.get("name")?,
            slug: record.get("slug")?,
            description: record.get("description")?,
            maker: record.get("maker")?,
            created: record.get("created")?,
            updated: record.get("updated")?,
        })
    }
}

impl FromRecord for EventSummary {
    fn from_record(record: &Record<'_>) -> Result<Self, DbError> {
        Ok(EventSummary {
            id: record.get("id")?,
            name: record.get("name")?,
        })
    }
}

impl FromRecord for Registration {
    fn from_record(record: &Record<'_>) -> Result<Self, DbError> {
        Ok(Registration {
            id: record.get("id")?,
            name: record.get("name")?,
            comment: record.get("comment")?,
            event: record.get("event")?,
        })
    }
}

impl Database {
    // -- Events --

    /// Insert an event. The slug is derived from `name` here and never again.
    pub async fn create_event(
        &self,
        name: &str,
        description: Option<&str>,
        maker: Option<i64>,
    ) -> Result<Event, DbError> {
        let rows = self
            .execute(
                "INSERT INTO events (name, slug, description, maker)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, name, slug, description, maker, created, updated",
                vec![
                    text(name),
                    Value::Text(slugify(name)),
                    optional_text(description),
                    maker.map_or(Value::Null, Value::Integer),
                ],
            )
            .await?;
        inserted(&rows)
    }

    /// Change name and/or slug and refresh `updated`. Description is never
    /// touched and the slug is not recomputed from a new name.
    pub async fn update_event(
        &self,
        id: i64,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> Result<Updated<Event>, DbError> {
        let touched = if name.is_some() || slug.is_some() {
            FieldValue::from(Utc::now())
        } else {
            FieldValue::Null
        };

        self.conditional_update(
            id,
            &[EventColumn::Name, EventColumn::Slug, EventColumn::Updated],
            &[FieldValue::from(name), FieldValue::from(slug), touched],
        )
        .await?
        .decode()
    }

    pub async fn get_event_by_id(&self, id: i64) -> Result<Option<Event>, DbError> {
        self.execute(
            "SELECT id, name, slug, description, maker, created, updated
             FROM events WHERE id = ?1",
            vec![Value::Integer(id)],
        )
        .await?
        .decode_first()
    }

    pub async fn get_event_by_slug(&self, slug: &str) -> Result<Option<Event>, DbError> {
        self.execute(
            "SELECT id, name, slug, description, maker, created, updated
             FROM events WHERE slug = ?1",
            vec![text(slug)],
        )
        .await?
        .decode_first()
    }

    pub async fn list_events(&self) -> Result<Vec<EventSummary>, DbError> {
        self.execute("SELECT id, name FROM events ORDER BY id", vec![])
            .await?
            .decode()
    }

    /// Returns false when no event had this id. Registrations go with it.
    pub async fn delete_event(&self, id: i64) -> Result<bool, DbError> {
        let rows = self
            .execute("DELETE FROM events WHERE id = ?1", vec![Value::Integer(id)])
            .await?;
        Ok(rows.row_count() > 0)
    }

    // -- Registrations --

    pub async fn register(
        &self,
        event: i64,
        name: &str,
        comment: Option<&str>,
    ) -> Result<Registration, DbError> {
        let rows = self
            .execute(
                "INSERT INTO registrations (name, comment, event)
                 VALUES (?1, ?2, ?3)
                 RETURNING id, name, comment, event",
                vec![text(name), optional_text(comment), Value::Integer(event)],
            )
            .await?;
        inserted(&rows)
    }

    pub async fn update_registration(
        &self,
        id: i64,
        name: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Updated<Registration>, DbError> {
        self.conditional_update(
            id,
            &[RegistrationColumn::Name, RegistrationColumn::Comment],
            &[FieldValue::from(name), FieldValue::from(comment)],
        )
        .await?
        .decode()
    }

    pub async fn list_registrations(&self, event: i64) -> Result<Vec<Registration>, DbError> {
        self.execute(
            "SELECT id, name, comment, event FROM registrations WHERE event = ?1 ORDER BY id",
            vec![Value::Integer(event)],
        )
        .await?
        .decode()
    }

    /// Remove `name`'s registration for `event`. Returns how many rows went.
    pub async fn delete_registration(&self, name: &str, event: i64) -> Result<usize, DbError> {
        let rows = self
            .execute(
                "DELETE FROM registrations WHERE event = ?1 AND name = ?2",
                vec![Value::Integer(event), text(name)],
            )
            .await?;
        Ok(rows.row_count())
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn optional_text(s: Option<&str>) -> Value {
    s.map_or(Value::Null, text)
}

fn inserted<T: FromRecord>(rows: &RowSet) -> Result<T, DbError> {
    rows.decode_first()?.ok_or_else(|| DbError::Decode {
        column: "id".into(),
        reason: "insert returned no row".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::open_with_schema;

    #[tokio::test]
    async fn create_event_derives_slug() {
        let db = open_with_schema(1).await;

        let event = db
            .create_event("Rust Meetup 2025", Some("Monthly"), None)
            .await
            .unwrap();
        assert_eq!(event.slug, "rust-meetup-2025");
        assert_eq!(event.description.as_deref(), Some("Monthly"));
        assert_eq!(event.created, event.updated);

        let found = db.get_event_by_slug("rust-meetup-2025").await.unwrap();
        assert_eq!(found, Some(event));
    }

    #[tokio::test]
    async fn duplicate_slug_is_a_unique_violation() {
        let db = open_with_schema(1).await;
        db.create_event("Party", None, None).await.unwrap();

        let err = db.create_event("party", None, None).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn update_event_keeps_description_and_slug() {
        let db = open_with_schema(1).await;
        let event = db
            .create_event("Party", Some("Bring snacks"), None)
            .await
            .unwrap();

        let updated = db
            .update_event(event.id, Some("Garden Party"), None)
            .await
            .unwrap()
            .row()
            .unwrap();
        assert_eq!(updated.name, "Garden Party");
        assert_eq!(updated.slug, "party");
        assert_eq!(updated.description.as_deref(), Some("Bring snacks"));

        let renamed = db
            .update_event(event.id, None, Some("garden-party"))
            .await
            .unwrap()
            .row()
            .unwrap();
        assert_eq!(renamed.slug, "garden-party");
        assert_eq!(renamed.name, "Garden Party");
    }

    #[tokio::test]
    async fn update_event_refreshes_updated() {
        let db = open_with_schema(1).await;
        let event = db.create_event("Party", None, None).await.unwrap();
        db.execute(
            "UPDATE events SET updated = '2000-01-01 00:00:00' WHERE id = ?1",
            vec![Value::Integer(event.id)],
        )
        .await
        .unwrap();
        let stale = db.get_event_by_id(event.id).await.unwrap().unwrap().updated;

        // Nothing to change: no statement, so `updated` stays put.
        assert_eq!(
            db.update_event(event.id, None, None).await.unwrap(),
            Updated::Unchanged
        );
        let untouched = db.get_event_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(untouched.updated, stale);

        let renamed = db
            .update_event(event.id, Some("Garden Party"), None)
            .await
            .unwrap()
            .row()
            .unwrap();
        assert!(renamed.updated > stale);
        assert_eq!(renamed.created, event.created);

        db.execute(
            "UPDATE events SET updated = '2000-01-01 00:00:00' WHERE id = ?1",
            vec![Value::Integer(event.id)],
        )
        .await
        .unwrap();
        let reslugged = db
            .update_event(event.id, None, Some("garden"))
            .await
            .unwrap()
            .row()
            .unwrap();
        assert!(reslugged.updated > stale);
    }

    #[tokio::test]
    async fn update_event_outcomes() {
        let db = open_with_schema(1).await;
        let event = db.create_event("Party", None, None).await.unwrap();

        assert_eq!(
            db.update_event(event.id, None, None).await.unwrap(),
            Updated::Unchanged
        );
        assert_eq!(
            db.update_event(event.id + 100, Some("Nope"), None).await.unwrap(),
            Updated::NotFound
        );
    }

    #[tokio::test]
    async fn list_and_delete_events() {
        let db = open_with_schema(1).await;
        let a = db.create_event("Alpha", None, None).await.unwrap();
        let b = db.create_event("Beta", None, None).await.unwrap();
        db.register(a.id, "Ann", None).await.unwrap();

        let names: Vec<String> = db
            .list_events()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);

        assert!(db.delete_event(a.id).await.unwrap());
        assert!(!db.delete_event(a.id).await.unwrap());
        assert!(db.get_event_by_id(a.id).await.unwrap().is_none());
        assert!(db.list_registrations(a.id).await.unwrap().is_empty());
        assert!(db.get_event_by_id(b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn registrations_lifecycle() {
        let db = open_with_schema(1).await;
        let party = db.create_event("Party", None, None).await.unwrap();
        let talk = db.create_event("Talk", None, None).await.unwrap();

        let reg = db
            .register(party.id, "Ann", Some("vegetarian"))
            .await
            .unwrap();
        db.register(talk.id, "Ann", None).await.unwrap();
        assert_eq!(reg.event, party.id);
        assert_eq!(reg.comment.as_deref(), Some("vegetarian"));

        let changed = db
            .update_registration(reg.id, None, Some("vegan"))
            .await
            .unwrap()
            .row()
            .unwrap();
        assert_eq!(changed.name, "Ann");
        assert_eq!(changed.comment.as_deref(), Some("vegan"));

        // Only the registration for the given event goes.
        assert_eq!(db.delete_registration("Ann", party.id).await.unwrap(), 1);
        assert!(db.list_registrations(party.id).await.unwrap().is_empty());
        assert_eq!(db.list_registrations(talk.id).await.unwrap().len(), 1);
        assert_eq!(db.delete_registration("Ann", party.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn registration_requires_existing_event() {
        let db = open_with_schema(1).await;
        let err = db.register(404, "Ann", None).await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));
    }
}
