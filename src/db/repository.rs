//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. People and
//! churches are stored as a contact identity row plus a detail row keyed by
//! the contact id; the sync engine's upserts work on that composition.

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::access::Filter;
use crate::errors::AppError;
use crate::mapper::{EntityKind, InternalRecord};
use crate::models::{
    Church, Communication, Contact, ContactType, CreateChurchRequest, CreateCommunicationRequest,
    CreateOfficeRequest, CreatePersonRequest, CreateTaskRequest, CreateUserRequest, Office,
    OfficeMembership, Person, Role, Task, User,
};

/// Contact columns the sync engine may write.
const CONTACT_SYNC_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "name",
    "email",
    "phone",
    "street_address",
    "city",
    "state",
    "zip_code",
    "notes",
    "status",
    "user_id",
    "office_id",
    "last_synced_at",
    "created_at",
    "updated_at",
];

const PERSON_DETAIL_COLUMNS: &[&str] = &[
    "birthday",
    "marital_status",
    "spouse_name",
    "facebook_url",
    "pipeline_stage",
    "assignment",
];

const CHURCH_DETAIL_COLUMNS: &[&str] = &[
    "denomination",
    "pastor_name",
    "pastor_email",
    "pastor_phone",
    "congregation_size",
    "pipeline_stage",
];

const TASK_COLUMNS: &[&str] = &[
    "title",
    "description",
    "due_date",
    "completed",
    "person_id",
    "church_id",
    "office_id",
    "assigned_to_id",
    "created_by_id",
    "last_synced_at",
    "created_at",
    "updated_at",
];

const COMMUNICATION_COLUMNS: &[&str] = &[
    "comm_type",
    "subject",
    "message",
    "direction",
    "person_id",
    "church_id",
    "office_id",
    "user_id",
    "sent_at",
    "last_synced_at",
    "created_at",
    "updated_at",
];

const PERSON_SELECT: &str = r#"
    SELECT c.id, c.first_name, c.last_name, c.email, c.phone, c.street_address,
           c.city, c.state, c.zip_code, c.notes, c.status, c.user_id, c.office_id,
           p.birthday, p.marital_status, p.spouse_name, p.facebook_url,
           p.pipeline_stage, p.assignment,
           c.last_synced_at, c.created_at, c.updated_at
    FROM contacts c
    JOIN person_details p ON p.contact_id = c.id
    WHERE c.contact_type = 'person'
"#;

const CHURCH_SELECT: &str = r#"
    SELECT c.id, c.name, c.email, c.phone, c.street_address,
           c.city, c.state, c.zip_code, c.notes, c.status, c.user_id, c.office_id,
           ch.denomination, ch.pastor_name, ch.pastor_email, ch.pastor_phone,
           ch.congregation_size, ch.pipeline_stage,
           c.last_synced_at, c.created_at, c.updated_at
    FROM contacts c
    JOIN church_details ch ON ch.contact_id = c.id
    WHERE c.contact_type = 'church'
"#;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER / OFFICE OPERATIONS ====================

    /// Create a new user.
    pub async fn create_user(&self, request: &CreateUserRequest) -> Result<User, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO users (username, email, role, office_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(request.role.as_str())
        .bind(request.office_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: request.username.clone(),
            email: request.email.clone(),
            role: request.role,
            office_id: request.office_id,
            created_at: now,
        })
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, email, role, office_id, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Create a new office.
    pub async fn create_office(&self, request: &CreateOfficeRequest) -> Result<Office, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query("INSERT INTO offices (name, created_at) VALUES (?, ?)")
            .bind(&request.name)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        Ok(Office {
            id: result.last_insert_rowid(),
            name: request.name.clone(),
            created_at: now,
        })
    }

    /// Add a user to an office.
    ///
    /// The membership column is TEXT, so the numeric user id is stored in its
    /// string form.
    pub async fn add_office_member(
        &self,
        office_id: i64,
        user_id: i64,
    ) -> Result<OfficeMembership, AppError> {
        let user_key = user_id.to_string();
        let result = sqlx::query(
            "INSERT INTO office_memberships (user_id, office_id) VALUES (?, ?)",
        )
        .bind(&user_key)
        .bind(office_id)
        .execute(&self.pool)
        .await?;

        Ok(OfficeMembership {
            id: result.last_insert_rowid(),
            user_id: user_key,
            office_id,
        })
    }

    /// Resolve the offices a user belongs to via the membership table.
    pub async fn office_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let rows = sqlx::query(
            "SELECT office_id FROM office_memberships WHERE user_id = ? ORDER BY office_id",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("office_id")).collect())
    }

    // ==================== PERSON OPERATIONS ====================

    /// Create a new person: a contact row plus its detail row.
    pub async fn create_person(&self, request: &CreatePersonRequest) -> Result<Person, AppError> {
        let now = Utc::now().to_rfc3339();
        let last_name = request.last_name.clone().unwrap_or_default();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"INSERT INTO contacts (
                contact_type, first_name, last_name, email, phone, street_address,
                city, state, zip_code, notes, status, user_id, office_id,
                created_at, updated_at
            ) VALUES ('person', ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?)"#,
        )
        .bind(&request.first_name)
        .bind(&last_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.street_address)
        .bind(&request.city)
        .bind(&request.state)
        .bind(&request.zip_code)
        .bind(&request.notes)
        .bind(request.user_id)
        .bind(request.office_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        sqlx::query(
            r#"INSERT INTO person_details (
                contact_id, birthday, marital_status, spouse_name, facebook_url,
                pipeline_stage, assignment
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&request.birthday)
        .bind(&request.marital_status)
        .bind(&request.spouse_name)
        .bind(&request.facebook_url)
        .bind(&request.pipeline_stage)
        .bind(&request.assignment)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Person {
            id,
            first_name: request.first_name.clone(),
            last_name,
            email: request.email.clone(),
            phone: request.phone.clone(),
            street_address: request.street_address.clone(),
            city: request.city.clone(),
            state: request.state.clone(),
            zip_code: request.zip_code.clone(),
            notes: request.notes.clone(),
            status: "active".to_string(),
            user_id: request.user_id,
            office_id: request.office_id,
            birthday: request.birthday.clone(),
            marital_status: request.marital_status.clone(),
            spouse_name: request.spouse_name.clone(),
            facebook_url: request.facebook_url.clone(),
            pipeline_stage: request.pipeline_stage.clone(),
            assignment: request.assignment.clone(),
            last_synced_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a person by ID.
    pub async fn get_person(&self, id: i64) -> Result<Option<Person>, AppError> {
        let sql = format!("{PERSON_SELECT} AND c.id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(person_from_row))
    }

    /// List people visible under an access filter.
    pub async fn list_people(&self, filter: &Filter) -> Result<Vec<Person>, AppError> {
        let (clause, binds) = contact_scope_clause(filter);
        let sql = format!("{PERSON_SELECT} AND {clause} ORDER BY c.last_name, c.first_name");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(person_from_row).collect())
    }

    // ==================== CHURCH OPERATIONS ====================

    /// Create a new church: a contact row plus its detail row.
    pub async fn create_church(&self, request: &CreateChurchRequest) -> Result<Church, AppError> {
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"INSERT INTO contacts (
                contact_type, name, email, phone, street_address,
                city, state, zip_code, notes, status, user_id, office_id,
                created_at, updated_at
            ) VALUES ('church', ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?, ?, ?)"#,
        )
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.street_address)
        .bind(&request.city)
        .bind(&request.state)
        .bind(&request.zip_code)
        .bind(&request.notes)
        .bind(request.user_id)
        .bind(request.office_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        sqlx::query(
            r#"INSERT INTO church_details (
                contact_id, denomination, pastor_name, pastor_email, pastor_phone,
                congregation_size, pipeline_stage
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(&request.denomination)
        .bind(&request.pastor_name)
        .bind(&request.pastor_email)
        .bind(&request.pastor_phone)
        .bind(request.congregation_size)
        .bind(&request.pipeline_stage)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Church {
            id,
            name: request.name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            street_address: request.street_address.clone(),
            city: request.city.clone(),
            state: request.state.clone(),
            zip_code: request.zip_code.clone(),
            notes: request.notes.clone(),
            status: "active".to_string(),
            user_id: request.user_id,
            office_id: request.office_id,
            denomination: request.denomination.clone(),
            pastor_name: request.pastor_name.clone(),
            pastor_email: request.pastor_email.clone(),
            pastor_phone: request.pastor_phone.clone(),
            congregation_size: request.congregation_size,
            pipeline_stage: request.pipeline_stage.clone(),
            last_synced_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a church by ID.
    pub async fn get_church(&self, id: i64) -> Result<Option<Church>, AppError> {
        let sql = format!("{CHURCH_SELECT} AND c.id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(church_from_row))
    }

    /// List churches visible under an access filter.
    pub async fn list_churches(&self, filter: &Filter) -> Result<Vec<Church>, AppError> {
        let (clause, binds) = contact_scope_clause(filter);
        let sql = format!("{CHURCH_SELECT} AND {clause} ORDER BY c.name");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(church_from_row).collect())
    }

    // ==================== TASK OPERATIONS ====================

    /// Create a new task.
    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"INSERT INTO tasks (
                title, description, due_date, completed, person_id, church_id,
                office_id, assigned_to_id, created_by_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.due_date)
        .bind(request.completed as i32)
        .bind(request.person_id)
        .bind(request.church_id)
        .bind(request.office_id)
        .bind(request.assigned_to_id)
        .bind(request.created_by_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Task {
            id: result.last_insert_rowid(),
            title: request.title.clone(),
            description: request.description.clone(),
            due_date: request.due_date.clone(),
            completed: request.completed,
            person_id: request.person_id,
            church_id: request.church_id,
            office_id: request.office_id,
            assigned_to_id: request.assigned_to_id,
            created_by_id: request.created_by_id,
            last_synced_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a task by ID.
    pub async fn get_task(&self, id: i64) -> Result<Option<Task>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, title, description, due_date, completed, person_id, church_id,
                      office_id, assigned_to_id, created_by_id, last_synced_at,
                      created_at, updated_at
               FROM tasks WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(task_from_row))
    }

    /// List tasks visible under an access filter.
    pub async fn list_tasks(&self, filter: &Filter) -> Result<Vec<Task>, AppError> {
        let (clause, binds) = task_scope_clause(filter);
        let sql = format!(
            r#"SELECT id, title, description, due_date, completed, person_id, church_id,
                      office_id, assigned_to_id, created_by_id, last_synced_at,
                      created_at, updated_at
               FROM tasks WHERE {clause} ORDER BY due_date, id"#,
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    // ==================== COMMUNICATION OPERATIONS ====================

    /// Log a new communication.
    pub async fn create_communication(
        &self,
        request: &CreateCommunicationRequest,
    ) -> Result<Communication, AppError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"INSERT INTO communications (
                comm_type, subject, message, direction, person_id, church_id,
                office_id, user_id, sent_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&request.comm_type)
        .bind(&request.subject)
        .bind(&request.message)
        .bind(&request.direction)
        .bind(request.person_id)
        .bind(request.church_id)
        .bind(request.office_id)
        .bind(request.user_id)
        .bind(&request.sent_at)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Communication {
            id: result.last_insert_rowid(),
            comm_type: request.comm_type.clone(),
            subject: request.subject.clone(),
            message: request.message.clone(),
            direction: request.direction.clone(),
            person_id: request.person_id,
            church_id: request.church_id,
            office_id: request.office_id,
            user_id: request.user_id,
            sent_at: request.sent_at.clone(),
            last_synced_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a communication by ID.
    pub async fn get_communication(&self, id: i64) -> Result<Option<Communication>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, comm_type, subject, message, direction, person_id, church_id,
                      office_id, user_id, sent_at, last_synced_at, created_at, updated_at
               FROM communications WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(communication_from_row))
    }

    /// List communications visible under an access filter.
    pub async fn list_communications(
        &self,
        filter: &Filter,
    ) -> Result<Vec<Communication>, AppError> {
        let (clause, binds) = communication_scope_clause(filter);
        let sql = format!(
            r#"SELECT id, comm_type, subject, message, direction, person_id, church_id,
                      office_id, user_id, sent_at, last_synced_at, created_at, updated_at
               FROM communications WHERE {clause} ORDER BY sent_at DESC, id"#,
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(*bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.iter().map(communication_from_row).collect())
    }

    // ==================== CONTACT / CONFLICT OPERATIONS ====================

    /// Get a raw contact row by ID.
    pub async fn get_contact(&self, id: i64) -> Result<Option<Contact>, AppError> {
        let row = sqlx::query(
            r#"SELECT id, contact_type, first_name, last_name, name, email, phone,
                      street_address, city, state, zip_code, notes, status, user_id,
                      office_id, has_conflict, conflict_data, last_synced_at,
                      created_at, updated_at
               FROM contacts WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(contact_from_row))
    }

    /// Record a detected conflict on a contact.
    pub async fn set_conflict(&self, contact_id: i64, conflict_json: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE contacts SET has_conflict = 1, conflict_data = ? WHERE id = ?")
            .bind(conflict_json)
            .bind(contact_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch the stored conflict map for a contact, if any.
    pub async fn conflict_data(&self, contact_id: i64) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT conflict_data FROM contacts WHERE id = ? AND has_conflict = 1")
            .bind(contact_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|r| r.get("conflict_data")))
    }

    // ==================== SYNC UPSERT OPERATIONS ====================

    /// Ensure a contact identity row exists for a pulled specialization
    /// record, creating it with the explicit identity when missing.
    ///
    /// Returns true when the row was created.
    pub async fn ensure_contact(
        &self,
        id: i64,
        contact_type: ContactType,
        values: &InternalRecord,
    ) -> Result<bool, AppError> {
        let exists = sqlx::query("SELECT id FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        let now = Utc::now().to_rfc3339();
        let mut pairs = collect_pairs(CONTACT_SYNC_COLUMNS, values);

        if exists {
            if !pairs.is_empty() {
                self.update_row("contacts", "id", id, &pairs).await?;
            }
            return Ok(false);
        }

        ensure_pair(&mut pairs, "created_at", &now);
        ensure_pair(&mut pairs, "updated_at", &now);

        let cols: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
        let sql = format!(
            "INSERT INTO contacts (id, contact_type, {}) VALUES (?, ?, {})",
            cols.join(", "),
            placeholders(pairs.len())
        );
        let mut query = sqlx::query(&sql).bind(id).bind(contact_type.as_str());
        for (_, value) in &pairs {
            query = bind_value(query, value);
        }
        query.execute(&self.pool).await?;

        Ok(true)
    }

    /// Create-or-update the person detail row for a contact.
    pub async fn upsert_person_details(
        &self,
        contact_id: i64,
        values: &InternalRecord,
    ) -> Result<(), AppError> {
        self.upsert_details("person_details", PERSON_DETAIL_COLUMNS, contact_id, values)
            .await
    }

    /// Create-or-update the church detail row for a contact.
    pub async fn upsert_church_details(
        &self,
        contact_id: i64,
        values: &InternalRecord,
    ) -> Result<(), AppError> {
        self.upsert_details("church_details", CHURCH_DETAIL_COLUMNS, contact_id, values)
            .await
    }

    async fn upsert_details(
        &self,
        table: &str,
        columns: &[&'static str],
        contact_id: i64,
        values: &InternalRecord,
    ) -> Result<(), AppError> {
        let sql = format!("SELECT contact_id FROM {table} WHERE contact_id = ?");
        let exists = sqlx::query(&sql)
            .bind(contact_id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        let pairs = collect_pairs(columns, values);

        if exists {
            if !pairs.is_empty() {
                self.update_row(table, "contact_id", contact_id, &pairs).await?;
            }
            return Ok(());
        }

        let cols: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
        let sql = if pairs.is_empty() {
            format!("INSERT INTO {table} (contact_id) VALUES (?)")
        } else {
            format!(
                "INSERT INTO {table} (contact_id, {}) VALUES (?, {})",
                cols.join(", "),
                placeholders(pairs.len())
            )
        };
        let mut query = sqlx::query(&sql).bind(contact_id);
        for (_, value) in &pairs {
            query = bind_value(query, value);
        }
        query.execute(&self.pool).await?;

        Ok(())
    }

    /// Create-or-update a task from a pulled record. Returns true on create.
    pub async fn upsert_task(&self, id: i64, values: &InternalRecord) -> Result<bool, AppError> {
        self.upsert_flat("tasks", TASK_COLUMNS, id, values).await
    }

    /// Create-or-update a communication from a pulled record. Returns true on
    /// create.
    pub async fn upsert_communication(
        &self,
        id: i64,
        values: &InternalRecord,
    ) -> Result<bool, AppError> {
        self.upsert_flat("communications", COMMUNICATION_COLUMNS, id, values)
            .await
    }

    async fn upsert_flat(
        &self,
        table: &str,
        columns: &[&'static str],
        id: i64,
        values: &InternalRecord,
    ) -> Result<bool, AppError> {
        let sql = format!("SELECT id FROM {table} WHERE id = ?");
        let exists = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        let now = Utc::now().to_rfc3339();
        let mut pairs = collect_pairs(columns, values);

        if exists {
            if !pairs.is_empty() {
                self.update_row(table, "id", id, &pairs).await?;
            }
            return Ok(false);
        }

        ensure_pair(&mut pairs, "created_at", &now);
        ensure_pair(&mut pairs, "updated_at", &now);

        let cols: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
        let sql = format!(
            "INSERT INTO {table} (id, {}) VALUES (?, {})",
            cols.join(", "),
            placeholders(pairs.len())
        );
        let mut query = sqlx::query(&sql).bind(id);
        for (_, value) in &pairs {
            query = bind_value(query, value);
        }
        query.execute(&self.pool).await?;

        Ok(true)
    }

    async fn update_row(
        &self,
        table: &str,
        key_col: &str,
        id: i64,
        pairs: &[(&'static str, Value)],
    ) -> Result<(), AppError> {
        let sets: Vec<String> = pairs.iter().map(|(c, _)| format!("{c} = ?")).collect();
        let sql = format!("UPDATE {table} SET {} WHERE {key_col} = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        for (_, value) in pairs {
            query = bind_value(query, value);
        }
        query.bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Stamp an entity's local sync timestamp.
    pub async fn mark_synced(
        &self,
        kind: EntityKind,
        id: i64,
        timestamp: &str,
    ) -> Result<(), AppError> {
        let table = match kind {
            EntityKind::Person | EntityKind::Church => "contacts",
            EntityKind::Task => "tasks",
            EntityKind::Communication => "communications",
        };
        let sql = format!("UPDATE {table} SET last_synced_at = ? WHERE id = ?");
        sqlx::query(&sql)
            .bind(timestamp)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply a conflict resolution in one transaction: write the winning
    /// values (empty when local wins), clear the conflict flag and details,
    /// and stamp a fresh sync timestamp.
    pub async fn apply_resolution(
        &self,
        kind: EntityKind,
        id: i64,
        values: &InternalRecord,
        now: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        match kind {
            EntityKind::Person | EntityKind::Church => {
                let (detail_table, detail_columns) = match kind {
                    EntityKind::Person => ("person_details", PERSON_DETAIL_COLUMNS),
                    _ => ("church_details", CHURCH_DETAIL_COLUMNS),
                };

                let contact_pairs = collect_pairs(CONTACT_SYNC_COLUMNS, values);
                if !contact_pairs.is_empty() {
                    update_in_tx(&mut tx, "contacts", "id", id, &contact_pairs).await?;
                }

                let detail_pairs = collect_pairs(detail_columns, values);
                if !detail_pairs.is_empty() {
                    update_in_tx(&mut tx, detail_table, "contact_id", id, &detail_pairs).await?;
                }

                sqlx::query(
                    "UPDATE contacts SET has_conflict = 0, conflict_data = NULL, last_synced_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            EntityKind::Task => {
                let pairs = collect_pairs(TASK_COLUMNS, values);
                if !pairs.is_empty() {
                    update_in_tx(&mut tx, "tasks", "id", id, &pairs).await?;
                }
                sqlx::query("UPDATE tasks SET last_synced_at = ?, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            EntityKind::Communication => {
                let pairs = collect_pairs(COMMUNICATION_COLUMNS, values);
                if !pairs.is_empty() {
                    update_in_tx(&mut tx, "communications", "id", id, &pairs).await?;
                }
                sqlx::query(
                    "UPDATE communications SET last_synced_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

// Scope clause builders: render an access filter into SQL for one collection.

fn contact_scope_clause(filter: &Filter) -> (String, Vec<i64>) {
    match filter {
        Filter::All => ("1 = 1".to_string(), vec![]),
        Filter::OwnedBy(user) | Filter::AssignedOrCreated(user) => {
            ("c.user_id = ?".to_string(), vec![*user])
        }
        Filter::OfficeIn(offices) => {
            if offices.is_empty() {
                ("0 = 1".to_string(), vec![])
            } else {
                (
                    format!("c.office_id IN ({})", placeholders(offices.len())),
                    offices.clone(),
                )
            }
        }
        Filter::OfficeOrOwned { offices, owner } => {
            if offices.is_empty() {
                ("c.user_id = ?".to_string(), vec![*owner])
            } else {
                let mut binds = offices.clone();
                binds.push(*owner);
                (
                    format!(
                        "(c.office_id IN ({}) OR c.user_id = ?)",
                        placeholders(offices.len())
                    ),
                    binds,
                )
            }
        }
        Filter::OfficeOrRelated(office) => ("c.office_id = ?".to_string(), vec![*office]),
        Filter::Nothing => ("0 = 1".to_string(), vec![]),
    }
}

fn task_scope_clause(filter: &Filter) -> (String, Vec<i64>) {
    match filter {
        Filter::All => ("1 = 1".to_string(), vec![]),
        Filter::OwnedBy(user) | Filter::AssignedOrCreated(user) => (
            "(assigned_to_id = ? OR created_by_id = ?)".to_string(),
            vec![*user, *user],
        ),
        Filter::OfficeIn(offices) => {
            if offices.is_empty() {
                ("0 = 1".to_string(), vec![])
            } else {
                (
                    format!("office_id IN ({})", placeholders(offices.len())),
                    offices.clone(),
                )
            }
        }
        Filter::OfficeOrOwned { offices, owner } => {
            if offices.is_empty() {
                (
                    "(assigned_to_id = ? OR created_by_id = ?)".to_string(),
                    vec![*owner, *owner],
                )
            } else {
                let mut binds = offices.clone();
                binds.push(*owner);
                binds.push(*owner);
                (
                    format!(
                        "(office_id IN ({}) OR assigned_to_id = ? OR created_by_id = ?)",
                        placeholders(offices.len())
                    ),
                    binds,
                )
            }
        }
        Filter::OfficeOrRelated(office) => (
            "(office_id = ? \
              OR person_id IN (SELECT id FROM contacts WHERE office_id = ?) \
              OR church_id IN (SELECT id FROM contacts WHERE office_id = ?))"
                .to_string(),
            vec![*office, *office, *office],
        ),
        Filter::Nothing => ("0 = 1".to_string(), vec![]),
    }
}

fn communication_scope_clause(filter: &Filter) -> (String, Vec<i64>) {
    match filter {
        Filter::All => ("1 = 1".to_string(), vec![]),
        Filter::OwnedBy(user) | Filter::AssignedOrCreated(user) => {
            ("user_id = ?".to_string(), vec![*user])
        }
        Filter::OfficeIn(offices) => {
            if offices.is_empty() {
                ("0 = 1".to_string(), vec![])
            } else {
                (
                    format!("office_id IN ({})", placeholders(offices.len())),
                    offices.clone(),
                )
            }
        }
        Filter::OfficeOrOwned { offices, owner } => {
            if offices.is_empty() {
                ("user_id = ?".to_string(), vec![*owner])
            } else {
                let mut binds = offices.clone();
                binds.push(*owner);
                (
                    format!(
                        "(office_id IN ({}) OR user_id = ?)",
                        placeholders(offices.len())
                    ),
                    binds,
                )
            }
        }
        Filter::OfficeOrRelated(office) => (
            "(office_id = ? \
              OR person_id IN (SELECT id FROM contacts WHERE office_id = ?) \
              OR church_id IN (SELECT id FROM contacts WHERE office_id = ?))"
                .to_string(),
            vec![*office, *office, *office],
        ),
        Filter::Nothing => ("0 = 1".to_string(), vec![]),
    }
}

// Dynamic column helpers for the sync upserts.

fn collect_pairs(
    columns: &[&'static str],
    values: &InternalRecord,
) -> Vec<(&'static str, Value)> {
    columns
        .iter()
        .filter_map(|col| values.get(*col).map(|v| (*col, v.clone())))
        .collect()
}

fn ensure_pair(pairs: &mut Vec<(&'static str, Value)>, column: &'static str, default: &str) {
    let missing = !pairs
        .iter()
        .any(|(col, value)| *col == column && !value.is_null());
    if missing {
        pairs.retain(|(col, _)| *col != column);
        pairs.push((column, Value::String(default.to_string())));
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Bind a JSON-typed value into a query, matching SQLite's dynamic typing.
fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        // Nested structures are stored as their JSON text.
        other => query.bind(other.to_string()),
    }
}

async fn update_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    table: &str,
    key_col: &str,
    id: i64,
    pairs: &[(&'static str, Value)],
) -> Result<(), sqlx::Error> {
    let sets: Vec<String> = pairs.iter().map(|(c, _)| format!("{c} = ?")).collect();
    let sql = format!("UPDATE {table} SET {} WHERE {key_col} = ?", sets.join(", "));
    let mut query = sqlx::query(&sql);
    for (_, value) in pairs {
        query = bind_value(query, value);
    }
    query.bind(id).execute(&mut **tx).await?;
    Ok(())
}

// Helper functions for row conversion

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    let role: String = row.get("role");
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        role: Role::from_str(&role).unwrap_or(Role::LimitedUser),
        office_id: row.get("office_id"),
        created_at: row.get("created_at"),
    }
}

fn person_from_row(row: &sqlx::sqlite::SqliteRow) -> Person {
    Person {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        street_address: row.get("street_address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        notes: row.get("notes"),
        status: row.get("status"),
        user_id: row.get("user_id"),
        office_id: row.get("office_id"),
        birthday: row.get("birthday"),
        marital_status: row.get("marital_status"),
        spouse_name: row.get("spouse_name"),
        facebook_url: row.get("facebook_url"),
        pipeline_stage: row.get("pipeline_stage"),
        assignment: row.get("assignment"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn church_from_row(row: &sqlx::sqlite::SqliteRow) -> Church {
    let name: Option<String> = row.get("name");
    Church {
        id: row.get("id"),
        name: name.unwrap_or_default(),
        email: row.get("email"),
        phone: row.get("phone"),
        street_address: row.get("street_address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        notes: row.get("notes"),
        status: row.get("status"),
        user_id: row.get("user_id"),
        office_id: row.get("office_id"),
        denomination: row.get("denomination"),
        pastor_name: row.get("pastor_name"),
        pastor_email: row.get("pastor_email"),
        pastor_phone: row.get("pastor_phone"),
        congregation_size: row.get("congregation_size"),
        pipeline_stage: row.get("pipeline_stage"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Task {
    let completed: i64 = row.get("completed");
    Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        due_date: row.get("due_date"),
        completed: completed != 0,
        person_id: row.get("person_id"),
        church_id: row.get("church_id"),
        office_id: row.get("office_id"),
        assigned_to_id: row.get("assigned_to_id"),
        created_by_id: row.get("created_by_id"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn communication_from_row(row: &sqlx::sqlite::SqliteRow) -> Communication {
    Communication {
        id: row.get("id"),
        comm_type: row.get("comm_type"),
        subject: row.get("subject"),
        message: row.get("message"),
        direction: row.get("direction"),
        person_id: row.get("person_id"),
        church_id: row.get("church_id"),
        office_id: row.get("office_id"),
        user_id: row.get("user_id"),
        sent_at: row.get("sent_at"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn contact_from_row(row: &sqlx::sqlite::SqliteRow) -> Contact {
    let contact_type: String = row.get("contact_type");
    let has_conflict: i64 = row.get("has_conflict");
    Contact {
        id: row.get("id"),
        contact_type: ContactType::from_str(&contact_type).unwrap_or(ContactType::Person),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        street_address: row.get("street_address"),
        city: row.get("city"),
        state: row.get("state"),
        zip_code: row.get("zip_code"),
        notes: row.get("notes"),
        status: row.get("status"),
        user_id: row.get("user_id"),
        office_id: row.get("office_id"),
        has_conflict: has_conflict != 0,
        conflict_data: row.get("conflict_data"),
        last_synced_at: row.get("last_synced_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use serde_json::json;
    use tempfile::TempDir;

    async fn test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .expect("Failed to init DB");
        (Repository::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_membership_lookup_uses_string_keys() {
        let (repo, _dir) = test_repo().await;

        let office = repo
            .create_office(&CreateOfficeRequest {
                name: "Nairobi".to_string(),
            })
            .await
            .unwrap();
        let user = repo
            .create_user(&CreateUserRequest {
                username: "amy".to_string(),
                email: None,
                role: Role::StandardUser,
                office_id: None,
            })
            .await
            .unwrap();

        let membership = repo.add_office_member(office.id, user.id).await.unwrap();
        assert_eq!(membership.user_id, user.id.to_string());

        let offices = repo.office_ids_for_user(user.id).await.unwrap();
        assert_eq!(offices, vec![office.id]);
        assert!(repo.office_ids_for_user(9999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_person_round_trip_through_composition() {
        let (repo, _dir) = test_repo().await;

        let created = repo
            .create_person(&CreatePersonRequest {
                first_name: "Priscilla".to_string(),
                last_name: Some("Aquila".to_string()),
                email: Some("p@example.org".to_string()),
                phone: None,
                street_address: None,
                city: None,
                state: None,
                zip_code: None,
                notes: None,
                user_id: Some(7),
                office_id: Some(2),
                birthday: None,
                marital_status: Some("married".to_string()),
                spouse_name: None,
                facebook_url: None,
                pipeline_stage: Some("contacted".to_string()),
                assignment: None,
            })
            .await
            .unwrap();

        let fetched = repo.get_person(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.first_name, "Priscilla");
        assert_eq!(fetched.user_id, Some(7));
        assert_eq!(fetched.pipeline_stage.as_deref(), Some("contacted"));

        // The backing contact row discriminates the specialization.
        let contact = repo.get_contact(created.id).await.unwrap().unwrap();
        assert_eq!(contact.contact_type, ContactType::Person);
    }

    #[tokio::test]
    async fn test_list_people_scoping() {
        let (repo, _dir) = test_repo().await;

        for (first, user, office) in [("A", 1, 10), ("B", 1, 20), ("C", 2, 10)] {
            repo.create_person(&CreatePersonRequest {
                first_name: first.to_string(),
                last_name: None,
                email: None,
                phone: None,
                street_address: None,
                city: None,
                state: None,
                zip_code: None,
                notes: None,
                user_id: Some(user),
                office_id: Some(office),
                birthday: None,
                marital_status: None,
                spouse_name: None,
                facebook_url: None,
                pipeline_stage: None,
                assignment: None,
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.list_people(&Filter::All).await.unwrap().len(), 3);
        assert_eq!(repo.list_people(&Filter::OwnedBy(1)).await.unwrap().len(), 2);
        assert_eq!(
            repo.list_people(&Filter::OfficeIn(vec![10]))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            repo.list_people(&Filter::OfficeOrOwned {
                offices: vec![20],
                owner: 2
            })
            .await
            .unwrap()
            .len(),
            2
        );
        assert!(repo
            .list_people(&Filter::OfficeIn(vec![]))
            .await
            .unwrap()
            .is_empty());
        assert!(repo.list_people(&Filter::Nothing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_contact_creates_with_explicit_identity() {
        let (repo, _dir) = test_repo().await;

        let mut values = InternalRecord::new();
        values.insert("first_name".to_string(), json!("Silas"));
        values.insert("user_id".to_string(), json!(4));

        let created = repo
            .ensure_contact(501, ContactType::Person, &values)
            .await
            .unwrap();
        assert!(created);

        let contact = repo.get_contact(501).await.unwrap().unwrap();
        assert_eq!(contact.first_name, "Silas");
        assert_eq!(contact.user_id, Some(4));

        // Second call updates in place instead of creating.
        values.insert("first_name".to_string(), json!("Silvanus"));
        let created_again = repo
            .ensure_contact(501, ContactType::Person, &values)
            .await
            .unwrap();
        assert!(!created_again);
        let contact = repo.get_contact(501).await.unwrap().unwrap();
        assert_eq!(contact.first_name, "Silvanus");
    }

    #[tokio::test]
    async fn test_apply_resolution_clears_conflict_in_one_pass() {
        let (repo, _dir) = test_repo().await;

        let person = repo
            .create_person(&CreatePersonRequest {
                first_name: "John".to_string(),
                last_name: None,
                email: None,
                phone: None,
                street_address: None,
                city: None,
                state: None,
                zip_code: None,
                notes: None,
                user_id: None,
                office_id: None,
                birthday: None,
                marital_status: None,
                spouse_name: None,
                facebook_url: None,
                pipeline_stage: None,
                assignment: None,
            })
            .await
            .unwrap();

        repo.set_conflict(person.id, r#"{"first_name":{}}"#)
            .await
            .unwrap();
        assert!(repo.conflict_data(person.id).await.unwrap().is_some());

        let mut values = InternalRecord::new();
        values.insert("first_name".to_string(), json!("Jane"));
        values.insert("pipeline_stage".to_string(), json!("committed"));
        repo.apply_resolution(EntityKind::Person, person.id, &values, "2026-08-06T00:00:00Z")
            .await
            .unwrap();

        let updated = repo.get_person(person.id).await.unwrap().unwrap();
        assert_eq!(updated.first_name, "Jane");
        assert_eq!(updated.pipeline_stage.as_deref(), Some("committed"));
        assert_eq!(updated.last_synced_at.as_deref(), Some("2026-08-06T00:00:00Z"));
        assert!(repo.conflict_data(person.id).await.unwrap().is_none());

        let contact = repo.get_contact(person.id).await.unwrap().unwrap();
        assert!(!contact.has_conflict);
    }
}
