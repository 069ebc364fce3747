//! Postgres-backed record store
//!
//! Lookups use `= ANY($1)` so each relation or uniqueness check is a single
//! round-trip. Simple inserts are one `UNNEST` statement with
//! `ON CONFLICT DO NOTHING`; the ids missing from `RETURNING` are the rows
//! that collided.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    key_column, scope_table, NewClass, NewRoom, NewStudent, NewSubject, NewTeacher,
    NewTimetableEntry, NewUser, RecordStore, StoreError,
};
use crate::ingest::types::{KeyField, Scope};

pub struct PgRecordStore {
    pool: Arc<PgPool>,
}

impl PgRecordStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn skipped_ids(requested: impl Iterator<Item = Uuid>, inserted: Vec<Uuid>) -> Vec<Uuid> {
    let inserted: HashSet<Uuid> = inserted.into_iter().collect();
    requested.filter(|id| !inserted.contains(id)).collect()
}

/// Insert users and their credentials inside an open transaction
async fn insert_users(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    users: &[&NewUser],
    role: &str,
) -> Result<(), StoreError> {
    let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    let emails: Vec<&str> = users.iter().map(|u| u.email.as_str()).collect();
    let hashes: Vec<&str> = users.iter().map(|u| u.password_hash.as_str()).collect();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, role)
        SELECT u.id, u.name, u.email, $4
        FROM UNNEST($1::uuid[], $2::text[], $3::text[]) AS u(id, name, email)
        "#,
    )
    .bind(&ids)
    .bind(&names)
    .bind(&emails)
    .bind(role)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO auth_accounts (user_id, password_hash)
        SELECT * FROM UNNEST($1::uuid[], $2::text[])
        "#,
    )
    .bind(&ids)
    .bind(&hashes)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn has_records(&self, scope: Scope) -> Result<bool, StoreError> {
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {})", scope_table(scope));
        let exists: bool = sqlx::query_scalar(&sql).fetch_one(&*self.pool).await?;
        Ok(exists)
    }

    async fn lookup_ids(
        &self,
        scope: Scope,
        field: KeyField,
        values: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let (table, column) = key_column(scope, field)?;
        if values.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT {column}, id::text FROM {table} WHERE {column} = ANY($1)",
            column = column,
            table = table
        );
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(values)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }

    async fn existing_values(
        &self,
        scope: Scope,
        field: KeyField,
        values: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let (table, column) = key_column(scope, field)?;
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {column} FROM {table} WHERE {column} = ANY($1)",
            column = column,
            table = table
        );
        let found: Vec<String> = sqlx::query_scalar(&sql)
            .bind(values)
            .fetch_all(&*self.pool)
            .await?;

        Ok(found)
    }

    async fn insert_classes(&self, rows: &[NewClass]) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let names: Vec<&str> = rows.iter().map(|r| r.class_name.as_str()).collect();
        let batches: Vec<&str> = rows.iter().map(|r| r.batch.as_str()).collect();

        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO classes (id, class_name, batch)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[])
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&ids)
        .bind(&names)
        .bind(&batches)
        .fetch_all(&*self.pool)
        .await?;

        Ok(skipped_ids(ids.into_iter(), inserted))
    }

    async fn insert_subjects(&self, rows: &[NewSubject]) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let codes: Vec<&str> = rows.iter().map(|r| r.subject_code.as_str()).collect();
        let names: Vec<&str> = rows.iter().map(|r| r.subject_name.as_str()).collect();

        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO subjects (id, subject_code, subject_name)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[])
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&ids)
        .bind(&codes)
        .bind(&names)
        .fetch_all(&*self.pool)
        .await?;

        Ok(skipped_ids(ids.into_iter(), inserted))
    }

    async fn insert_rooms(&self, rows: &[NewRoom]) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let numbers: Vec<&str> = rows.iter().map(|r| r.room_number.as_str()).collect();
        let buildings: Vec<&str> = rows.iter().map(|r| r.building_name.as_str()).collect();
        let floors: Vec<i32> = rows.iter().map(|r| r.floor_number).collect();

        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO rooms (id, room_number, building_name, floor_number)
            SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::int4[])
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&ids)
        .bind(&numbers)
        .bind(&buildings)
        .bind(&floors)
        .fetch_all(&*self.pool)
        .await?;

        Ok(skipped_ids(ids.into_iter(), inserted))
    }

    async fn insert_timetable(&self, rows: &[NewTimetableEntry]) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let classes: Vec<Uuid> = rows.iter().map(|r| r.class_id).collect();
        let teachers: Vec<Uuid> = rows.iter().map(|r| r.teacher_id).collect();
        let subjects: Vec<Uuid> = rows.iter().map(|r| r.subject_id).collect();
        let rooms: Vec<Uuid> = rows.iter().map(|r| r.room_id).collect();
        let days: Vec<&str> = rows.iter().map(|r| r.day_of_week.as_str()).collect();
        let starts: Vec<chrono::NaiveTime> = rows.iter().map(|r| r.start_time).collect();
        let ends: Vec<chrono::NaiveTime> = rows.iter().map(|r| r.end_time).collect();

        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO timetable_entries
                (id, class_id, teacher_id, subject_id, room_id, day_of_week, start_time, end_time)
            SELECT * FROM UNNEST(
                $1::uuid[], $2::uuid[], $3::uuid[], $4::uuid[], $5::uuid[],
                $6::text[], $7::time[], $8::time[]
            )
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&ids)
        .bind(&classes)
        .bind(&teachers)
        .bind(&subjects)
        .bind(&rooms)
        .bind(&days)
        .bind(&starts)
        .bind(&ends)
        .fetch_all(&*self.pool)
        .await?;

        Ok(skipped_ids(ids.into_iter(), inserted))
    }

    async fn insert_students(&self, rows: &[NewStudent]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let users: Vec<&NewUser> = rows.iter().map(|r| &r.user).collect();
        insert_users(&mut tx, &users, "student").await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let user_ids: Vec<Uuid> = rows.iter().map(|r| r.user.id).collect();
        let numbers: Vec<&str> = rows.iter().map(|r| r.registration_number.as_str()).collect();
        let classes: Vec<Uuid> = rows.iter().map(|r| r.class_id).collect();
        let statuses: Vec<&str> = rows.iter().map(|r| r.enrollment_status.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO students (id, user_id, registration_number, class_id, enrollment_status)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::uuid[], $5::text[])
            "#,
        )
        .bind(&ids)
        .bind(&user_ids)
        .bind(&numbers)
        .bind(&classes)
        .bind(&statuses)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_teachers(&self, rows: &[NewTeacher]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let users: Vec<&NewUser> = rows.iter().map(|r| &r.user).collect();
        insert_users(&mut tx, &users, "teacher").await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let user_ids: Vec<Uuid> = rows.iter().map(|r| r.user.id).collect();
        let codes: Vec<&str> = rows.iter().map(|r| r.teacher_id.as_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO teachers (id, user_id, teacher_id)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::text[])
            "#,
        )
        .bind(&ids)
        .bind(&user_ids)
        .bind(&codes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_ids_preserve_request_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert_eq!(skipped_ids([a, b, c].into_iter(), vec![b]), vec![a, c]);
        assert!(skipped_ids([a].into_iter(), vec![a]).is_empty());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_constraint_violation_is_a_rejected_write(pool: PgPool) {
        let insert = "INSERT INTO rooms (id, room_number, building_name, floor_number) VALUES ($1, 'R1', 'Main', 1)";
        sqlx::query(insert).bind(Uuid::new_v4()).execute(&pool).await.unwrap();

        let err = sqlx::query(insert)
            .bind(Uuid::new_v4())
            .execute(&pool)
            .await
            .unwrap_err();

        assert!(matches!(StoreError::from(err), StoreError::Rejected(_)));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_server_errors_stay_retryable(pool: PgPool) {
        // raised with a non-constraint SQLSTATE, as a deadlock would be
        let err = sqlx::query("DO $$ BEGIN RAISE EXCEPTION 'deadlock detected' USING ERRCODE = '40P01'; END $$")
            .execute(&pool)
            .await
            .unwrap_err();

        let err = StoreError::from(err);
        assert!(matches!(err, StoreError::Database(_)));
        assert!(err.is_transient());
    }
}
