//! SQLite-backed store.
//!
//! One writer connection, a small pool of reader connections handed out
//! round-robin, WAL journaling and foreign keys with `ON DELETE CASCADE`
//! carrying the dependent-row cleanup.

use chrono::{DateTime, Utc};
use promptly_core::{AppError, AppResult, StorageBackend};
use promptly_prompt::{
    Persona, Profile, Prompt, PromptTemplate, RoleResponse, DEFAULT_PROFILE_ID,
};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Params, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

use crate::store::{assign_id, Storage};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    attributes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS personas (
    id TEXT PRIMARY KEY,
    user_role_display TEXT NOT NULL,
    llm_role_display TEXT NOT NULL,
    profile_id TEXT NOT NULL,
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS prompt_templates (
    id TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    name TEXT NOT NULL DEFAULT '',
    persona_id TEXT NOT NULL,
    meta_role TEXT NOT NULL DEFAULT '',
    task TEXT NOT NULL DEFAULT '',
    answer_guideline TEXT NOT NULL DEFAULT '',
    template TEXT NOT NULL DEFAULT '',
    variables TEXT NOT NULL DEFAULT '[]',
    profile_id TEXT NOT NULL,
    PRIMARY KEY (id, version),
    FOREIGN KEY (persona_id) REFERENCES personas(id) ON DELETE CASCADE,
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS prompts (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    template_id TEXT NOT NULL,
    template_version INTEGER NOT NULL,
    variable_values TEXT NOT NULL DEFAULT '{}',
    content TEXT NOT NULL,
    profile_id TEXT NOT NULL,
    FOREIGN KEY (template_id, template_version)
        REFERENCES prompt_templates(id, version) ON DELETE CASCADE,
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_personas_profile ON personas(profile_id);
CREATE INDEX IF NOT EXISTS idx_templates_persona ON prompt_templates(persona_id);
CREATE INDEX IF NOT EXISTS idx_templates_profile ON prompt_templates(profile_id);
CREATE INDEX IF NOT EXISTS idx_prompts_template ON prompts(template_id, template_version);
CREATE INDEX IF NOT EXISTS idx_prompts_profile ON prompts(profile_id);
"#;

const PERSONA_COLUMNS: &str = "id, user_role_display, llm_role_display, profile_id";
const TEMPLATE_COLUMNS: &str =
    "id, version, name, persona_id, meta_role, task, answer_guideline, template, variables, profile_id";
const PROMPT_COLUMNS: &str =
    "id, name, template_id, template_version, variable_values, content, profile_id";
const PROFILE_COLUMNS: &str = "id, name, description, attributes, created_at, updated_at";

/// Relational store over a single SQLite database file.
///
/// Reads run concurrently on the reader pool; each write holds the gate
/// exclusively and runs in its own transaction.
pub struct SqliteStorage {
    path: PathBuf,
    gate: RwLock<()>,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    cursor: AtomicUsize,
    closed: AtomicBool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.path)
            .field("readers", &self.readers.len())
            .finish()
    }
}

impl SqliteStorage {
    /// Open (and create if needed) the database at `path`.
    ///
    /// The schema is created idempotently and the default profile is seeded.
    pub fn open(path: impl AsRef<Path>, read_pool_size: usize) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = open_connection(&path)?;
        writer
            .execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        initialize_schema(&mut writer)?;

        let readers = (0..read_pool_size.max(1))
            .map(|_| open_connection(&path).map(Mutex::new))
            .collect::<AppResult<Vec<_>>>()?;

        tracing::info!(
            "Opened SQLite store at {:?} ({} readers)",
            path,
            readers.len()
        );

        Ok(Self {
            path,
            gate: RwLock::new(()),
            writer: Mutex::new(writer),
            readers,
            cursor: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_open(&self) -> AppResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AppError::Storage(format!(
                "store at {:?} is closed",
                self.path
            )));
        }
        Ok(())
    }

    fn reader(&self) -> &Mutex<Connection> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        &self.readers[index]
    }

    /// Run `f` on a pooled reader under the shared gate.
    fn read<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        self.check_open()?;
        let _gate = self.gate.read().map_err(|_| poisoned())?;
        let conn = self.reader().lock().map_err(|_| poisoned())?;
        f(&*conn)
    }

    /// Run `f` in a transaction on the writer under the exclusive gate.
    ///
    /// The transaction commits when `f` succeeds and rolls back otherwise.
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> AppResult<T>) -> AppResult<T> {
        self.check_open()?;
        let _gate = self.gate.write().map_err(|_| poisoned())?;
        let mut conn = self.writer.lock().map_err(|_| poisoned())?;

        let tx = conn.transaction().map_err(db_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(db_err)?;
        Ok(out)
    }
}

fn open_connection(path: &Path) -> AppResult<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| AppError::Storage(format!("Failed to open {:?}: {}", path, e)))?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(db_err)?;
    Ok(conn)
}

fn initialize_schema(conn: &mut Connection) -> AppResult<()> {
    let schema_err = |e: rusqlite::Error| AppError::SchemaInit(e.to_string());

    let tx = conn.transaction().map_err(schema_err)?;
    tx.execute_batch(SCHEMA).map_err(schema_err)?;

    let now = Utc::now();
    let default = Profile::default_profile(now);
    tx.execute(
        "INSERT OR IGNORE INTO profiles (id, name, description, attributes, created_at, updated_at)
         VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
        params![
            default.id.to_string(),
            default.name,
            default.description,
            now.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )
    .map_err(schema_err)?;
    tx.commit().map_err(schema_err)?;

    tracing::debug!("Initialized schema");
    Ok(())
}

fn poisoned() -> AppError {
    AppError::Storage("SQLite store lock poisoned".to_string())
}

/// Map engine errors; constraint violations become caller errors.
fn db_err(e: rusqlite::Error) -> AppError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &e {
        if failure.code == ErrorCode::ConstraintViolation {
            return match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    AppError::Conflict(e.to_string())
                }
                _ => AppError::Validation(e.to_string()),
            };
        }
    }
    AppError::Storage(e.to_string())
}

fn conversion_err<E>(index: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
}

fn uuid_at(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(index, e))
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(index, e))
}

fn timestamp_at(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(index, e))
}

fn persona_from_row(row: &Row<'_>) -> rusqlite::Result<Persona> {
    Ok(Persona {
        id: uuid_at(row, 0)?,
        user_role_display: row.get(1)?,
        llm_role_display: row.get(2)?,
        profile_id: uuid_at(row, 3)?,
    })
}

fn template_from_row(row: &Row<'_>) -> rusqlite::Result<PromptTemplate> {
    Ok(PromptTemplate {
        id: uuid_at(row, 0)?,
        version: row.get(1)?,
        name: row.get(2)?,
        persona_id: uuid_at(row, 3)?,
        meta_role: row.get(4)?,
        task: row.get(5)?,
        answer_guideline: row.get(6)?,
        body: row.get(7)?,
        variables: json_at(row, 8)?,
        profile_id: uuid_at(row, 9)?,
    })
}

fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        template_id: uuid_at(row, 2)?,
        template_version: row.get(3)?,
        values: json_at(row, 4)?,
        content: row.get(5)?,
        profile_id: uuid_at(row, 6)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let attributes: Option<String> = row.get(3)?;
    let attributes = attributes
        .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_err(3, e)))
        .transpose()?;

    Ok(Profile {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        attributes,
        created_at: timestamp_at(row, 4)?,
        updated_at: timestamp_at(row, 5)?,
    })
}

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> AppResult<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params, map)
        .map_err(db_err)?
        .collect::<rusqlite::Result<Vec<T>>>()
        .map_err(db_err)?;
    Ok(rows)
}

fn query_one<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> AppResult<Option<T>> {
    conn.query_row(sql, params, map).optional().map_err(db_err)
}

fn exists<P: Params>(conn: &Connection, sql: &str, params: P) -> AppResult<bool> {
    conn.query_row(sql, params, |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(db_err)
}

fn require_profile(conn: &Connection, id: Uuid) -> AppResult<()> {
    if id == DEFAULT_PROFILE_ID
        || exists(conn, "SELECT 1 FROM profiles WHERE id = ?1", [id.to_string()])?
    {
        Ok(())
    } else {
        Err(AppError::Validation(format!("profile {} does not exist", id)))
    }
}

fn require_persona(conn: &Connection, id: Uuid) -> AppResult<()> {
    if exists(conn, "SELECT 1 FROM personas WHERE id = ?1", [id.to_string()])? {
        Ok(())
    } else {
        Err(AppError::Validation(format!("persona {} does not exist", id)))
    }
}

fn require_template_version(conn: &Connection, id: Uuid, version: u32) -> AppResult<()> {
    if exists(
        conn,
        "SELECT 1 FROM prompt_templates WHERE id = ?1 AND version = ?2",
        params![id.to_string(), version],
    )? {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "template {} version {} does not exist",
            id, version
        )))
    }
}

fn insert_template(conn: &Connection, template: &PromptTemplate) -> AppResult<()> {
    let variables = serde_json::to_string(&template.variables)?;
    conn.execute(
        &format!(
            "INSERT INTO prompt_templates ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            TEMPLATE_COLUMNS
        ),
        params![
            template.id.to_string(),
            template.version,
            template.name,
            template.persona_id.to_string(),
            template.meta_role,
            template.task,
            template.answer_guideline,
            template.body,
            variables,
            template.profile_id.to_string(),
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn scope_param(profile: Option<Uuid>) -> Option<String> {
    profile.map(|id| id.to_string())
}

impl Storage for SqliteStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Sqlite
    }

    // Persona operations

    fn create_persona(&self, mut persona: Persona) -> AppResult<Persona> {
        persona.id = assign_id(persona.id);
        self.write(|tx| {
            require_profile(tx, persona.profile_id)?;
            tx.execute(
                &format!("INSERT INTO personas ({}) VALUES (?1, ?2, ?3, ?4)", PERSONA_COLUMNS),
                params![
                    persona.id.to_string(),
                    persona.user_role_display,
                    persona.llm_role_display,
                    persona.profile_id.to_string(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Created persona {}", persona.id);
        Ok(persona)
    }

    fn get_persona(&self, id: Uuid) -> AppResult<Persona> {
        self.read(|conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM personas WHERE id = ?1", PERSONA_COLUMNS),
                [id.to_string()],
                persona_from_row,
            )
        })?
        .ok_or_else(|| AppError::not_found("persona", id))
    }

    fn list_personas(&self, profile: Option<Uuid>) -> AppResult<Vec<Persona>> {
        self.read(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM personas
                     WHERE ?1 IS NULL OR profile_id = ?1 OR profile_id = ?2
                     ORDER BY rowid",
                    PERSONA_COLUMNS
                ),
                params![scope_param(profile), DEFAULT_PROFILE_ID.to_string()],
                persona_from_row,
            )
        })
    }

    fn update_persona(&self, persona: Persona) -> AppResult<Persona> {
        self.write(|tx| {
            if !exists(tx, "SELECT 1 FROM personas WHERE id = ?1", [persona.id.to_string()])? {
                return Err(AppError::not_found("persona", persona.id));
            }
            require_profile(tx, persona.profile_id)?;
            tx.execute(
                "UPDATE personas SET user_role_display = ?2, llm_role_display = ?3, profile_id = ?4
                 WHERE id = ?1",
                params![
                    persona.id.to_string(),
                    persona.user_role_display,
                    persona.llm_role_display,
                    persona.profile_id.to_string(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Updated persona {}", persona.id);
        Ok(persona)
    }

    fn delete_persona(&self, id: Uuid) -> AppResult<()> {
        let removed = self.write(|tx| {
            tx.execute("DELETE FROM personas WHERE id = ?1", [id.to_string()])
                .map_err(db_err)
        })?;
        if removed == 0 {
            return Err(AppError::not_found("persona", id));
        }

        tracing::debug!("Deleted persona {}", id);
        Ok(())
    }

    // Template operations

    fn create_template(&self, mut template: PromptTemplate) -> AppResult<PromptTemplate> {
        template.id = assign_id(template.id);
        template.version = 1;
        self.write(|tx| {
            require_persona(tx, template.persona_id)?;
            require_profile(tx, template.profile_id)?;
            if exists(
                tx,
                "SELECT 1 FROM prompt_templates WHERE id = ?1",
                [template.id.to_string()],
            )? {
                return Err(AppError::Conflict(format!(
                    "template {} already exists",
                    template.id
                )));
            }
            insert_template(tx, &template)
        })?;

        tracing::debug!("Created template {} v1", template.id);
        Ok(template)
    }

    fn get_template(&self, id: Uuid) -> AppResult<PromptTemplate> {
        self.read(|conn| {
            query_one(
                conn,
                &format!(
                    "SELECT {} FROM prompt_templates WHERE id = ?1 ORDER BY version DESC LIMIT 1",
                    TEMPLATE_COLUMNS
                ),
                [id.to_string()],
                template_from_row,
            )
        })?
        .ok_or_else(|| AppError::not_found("template", id))
    }

    fn get_template_version(&self, id: Uuid, version: u32) -> AppResult<PromptTemplate> {
        self.read(|conn| {
            query_one(
                conn,
                &format!(
                    "SELECT {} FROM prompt_templates WHERE id = ?1 AND version = ?2",
                    TEMPLATE_COLUMNS
                ),
                params![id.to_string(), version],
                template_from_row,
            )
        })?
        .ok_or_else(|| AppError::not_found("template version", format!("{}@{}", id, version)))
    }

    fn list_templates(&self, profile: Option<Uuid>) -> AppResult<Vec<PromptTemplate>> {
        self.read(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM prompt_templates
                     WHERE ?1 IS NULL OR profile_id = ?1 OR profile_id = ?2
                     ORDER BY rowid",
                    TEMPLATE_COLUMNS
                ),
                params![scope_param(profile), DEFAULT_PROFILE_ID.to_string()],
                template_from_row,
            )
        })
    }

    fn list_template_versions(&self, id: Uuid) -> AppResult<Vec<PromptTemplate>> {
        let versions = self.read(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM prompt_templates WHERE id = ?1 ORDER BY version",
                    TEMPLATE_COLUMNS
                ),
                [id.to_string()],
                template_from_row,
            )
        })?;
        if versions.is_empty() {
            return Err(AppError::not_found("template", id));
        }
        Ok(versions)
    }

    fn list_templates_by_persona(&self, persona_id: Uuid) -> AppResult<Vec<PromptTemplate>> {
        self.read(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM prompt_templates WHERE persona_id = ?1 ORDER BY rowid",
                    TEMPLATE_COLUMNS
                ),
                [persona_id.to_string()],
                template_from_row,
            )
        })
    }

    fn update_template(&self, template: PromptTemplate) -> AppResult<PromptTemplate> {
        self.write(|tx| {
            if !exists(
                tx,
                "SELECT 1 FROM prompt_templates WHERE id = ?1 AND version = ?2",
                params![template.id.to_string(), template.version],
            )? {
                return Err(AppError::Conflict(format!(
                    "template {} has no version {}",
                    template.id, template.version
                )));
            }
            require_persona(tx, template.persona_id)?;
            require_profile(tx, template.profile_id)?;

            let variables = serde_json::to_string(&template.variables)?;
            tx.execute(
                "UPDATE prompt_templates
                 SET name = ?3, persona_id = ?4, meta_role = ?5, task = ?6,
                     answer_guideline = ?7, template = ?8, variables = ?9, profile_id = ?10
                 WHERE id = ?1 AND version = ?2",
                params![
                    template.id.to_string(),
                    template.version,
                    template.name,
                    template.persona_id.to_string(),
                    template.meta_role,
                    template.task,
                    template.answer_guideline,
                    template.body,
                    variables,
                    template.profile_id.to_string(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Updated template {} v{}", template.id, template.version);
        Ok(template)
    }

    fn create_template_version(&self, mut template: PromptTemplate) -> AppResult<PromptTemplate> {
        self.write(|tx| {
            let current: Option<u32> = tx
                .query_row(
                    "SELECT MAX(version) FROM prompt_templates WHERE id = ?1",
                    [template.id.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            let current = current.ok_or_else(|| AppError::not_found("template", template.id))?;
            require_persona(tx, template.persona_id)?;
            require_profile(tx, template.profile_id)?;

            template.version = current + 1;
            insert_template(tx, &template)
        })?;

        tracing::debug!("Created template {} v{}", template.id, template.version);
        Ok(template)
    }

    fn delete_template(&self, id: Uuid, version: u32) -> AppResult<()> {
        let removed = self.write(|tx| {
            tx.execute(
                "DELETE FROM prompt_templates WHERE id = ?1 AND version = ?2",
                params![id.to_string(), version],
            )
            .map_err(db_err)
        })?;
        if removed == 0 {
            return Err(AppError::not_found(
                "template version",
                format!("{}@{}", id, version),
            ));
        }

        tracing::debug!("Deleted template {} v{}", id, version);
        Ok(())
    }

    // Prompt operations

    fn create_prompt(&self, mut prompt: Prompt) -> AppResult<Prompt> {
        prompt.id = assign_id(prompt.id);
        self.write(|tx| {
            require_template_version(tx, prompt.template_id, prompt.template_version)?;
            require_profile(tx, prompt.profile_id)?;

            let values = serde_json::to_string(&prompt.values)?;
            tx.execute(
                &format!(
                    "INSERT INTO prompts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    PROMPT_COLUMNS
                ),
                params![
                    prompt.id.to_string(),
                    prompt.name,
                    prompt.template_id.to_string(),
                    prompt.template_version,
                    values,
                    prompt.content,
                    prompt.profile_id.to_string(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Created prompt {}", prompt.id);
        Ok(prompt)
    }

    fn get_prompt(&self, id: Uuid) -> AppResult<Prompt> {
        self.read(|conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM prompts WHERE id = ?1", PROMPT_COLUMNS),
                [id.to_string()],
                prompt_from_row,
            )
        })?
        .ok_or_else(|| AppError::not_found("prompt", id))
    }

    fn list_prompts(&self, profile: Option<Uuid>) -> AppResult<Vec<Prompt>> {
        self.read(|conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM prompts
                     WHERE ?1 IS NULL OR profile_id = ?1 OR profile_id = ?2
                     ORDER BY rowid",
                    PROMPT_COLUMNS
                ),
                params![scope_param(profile), DEFAULT_PROFILE_ID.to_string()],
                prompt_from_row,
            )
        })
    }

    fn update_prompt(&self, prompt: Prompt) -> AppResult<Prompt> {
        self.write(|tx| {
            if !exists(tx, "SELECT 1 FROM prompts WHERE id = ?1", [prompt.id.to_string()])? {
                return Err(AppError::not_found("prompt", prompt.id));
            }
            require_template_version(tx, prompt.template_id, prompt.template_version)?;
            require_profile(tx, prompt.profile_id)?;

            let values = serde_json::to_string(&prompt.values)?;
            tx.execute(
                "UPDATE prompts
                 SET name = ?2, template_id = ?3, template_version = ?4,
                     variable_values = ?5, content = ?6, profile_id = ?7
                 WHERE id = ?1",
                params![
                    prompt.id.to_string(),
                    prompt.name,
                    prompt.template_id.to_string(),
                    prompt.template_version,
                    values,
                    prompt.content,
                    prompt.profile_id.to_string(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Updated prompt {}", prompt.id);
        Ok(prompt)
    }

    fn delete_prompt(&self, id: Uuid) -> AppResult<()> {
        let removed = self.write(|tx| {
            tx.execute("DELETE FROM prompts WHERE id = ?1", [id.to_string()])
                .map_err(db_err)
        })?;
        if removed == 0 {
            return Err(AppError::not_found("prompt", id));
        }

        tracing::debug!("Deleted prompt {}", id);
        Ok(())
    }

    // Profile operations

    fn create_profile(&self, mut profile: Profile) -> AppResult<Profile> {
        profile.id = assign_id(profile.id);
        let now = Utc::now();
        profile.created_at = now;
        profile.updated_at = now;

        self.write(|tx| {
            let attributes = profile
                .attributes
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                &format!(
                    "INSERT INTO profiles ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    PROFILE_COLUMNS
                ),
                params![
                    profile.id.to_string(),
                    profile.name,
                    profile.description,
                    attributes,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Created profile {}", profile.id);
        Ok(profile)
    }

    fn get_profile(&self, id: Uuid) -> AppResult<Profile> {
        self.read(|conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
                [id.to_string()],
                profile_from_row,
            )
        })?
        .ok_or_else(|| AppError::not_found("profile", id))
    }

    fn list_profiles(&self) -> AppResult<Vec<Profile>> {
        self.read(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM profiles ORDER BY rowid", PROFILE_COLUMNS),
                (),
                profile_from_row,
            )
        })
    }

    fn update_profile(&self, mut profile: Profile) -> AppResult<Profile> {
        self.write(|tx| {
            let existing = query_one(
                tx,
                &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
                [profile.id.to_string()],
                profile_from_row,
            )?
            .ok_or_else(|| AppError::not_found("profile", profile.id))?;

            profile.created_at = existing.created_at;
            profile.updated_at = Utc::now();
            let attributes = profile
                .attributes
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "UPDATE profiles SET name = ?2, description = ?3, attributes = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    profile.id.to_string(),
                    profile.name,
                    profile.description,
                    attributes,
                    profile.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })?;

        tracing::debug!("Updated profile {}", profile.id);
        Ok(profile)
    }

    fn delete_profile(&self, id: Uuid) -> AppResult<()> {
        if id == DEFAULT_PROFILE_ID {
            return Err(AppError::Validation(
                "the default profile cannot be deleted".to_string(),
            ));
        }

        let removed = self.write(|tx| {
            tx.execute("DELETE FROM profiles WHERE id = ?1", [id.to_string()])
                .map_err(db_err)
        })?;
        if removed == 0 {
            return Err(AppError::not_found("profile", id));
        }

        tracing::debug!("Deleted profile {}", id);
        Ok(())
    }

    fn get_roles(&self, user_role: Option<&str>) -> AppResult<RoleResponse> {
        self.read(|conn| {
            let user_roles = query_all(
                conn,
                "SELECT DISTINCT user_role_display FROM personas ORDER BY user_role_display",
                (),
                |row| row.get(0),
            )?;
            let llm_roles = match user_role {
                Some(role) => query_all(
                    conn,
                    "SELECT DISTINCT llm_role_display FROM personas
                     WHERE user_role_display = ?1 ORDER BY llm_role_display",
                    [role],
                    |row| row.get(0),
                )?,
                None => Vec::new(),
            };
            Ok(RoleResponse {
                user_roles,
                llm_roles,
            })
        })
    }

    fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Wait for in-flight operations, then fold the WAL back into the main file
        let _gate = self.gate.write().map_err(|_| poisoned())?;
        let conn = self.writer.lock().map_err(|_| poisoned())?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(db_err)?;

        tracing::debug!("Closed SQLite store at {:?}", self.path);
        Ok(())
    }
}
