use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use crate::models::{
    ActionItem, ActionItemPatch, BreakEvenData, BusinessPlan, Conversation, ExtractedList,
    ListInput, Message, NewActionItem, PlanSection, Role, SectionKey,
};

const ACTION_ITEM_COLUMNS: &str =
    "id, content, completed, ordinal, parent_id, message_id, conversation_id, created_at, updated_at";
const LIST_COLUMNS: &str = "id, title, items, parent_id, conversation_id, created_at, updated_at";
const SECTION_COLUMNS: &str = "id, plan_id, section_key, title, content, ordinal, updated_at";

/// Optional filters for listing action items.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub conversation_id: Option<String>,
    pub parent_id: Option<String>,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn default_path() -> Result<PathBuf> {
        let data_dir = match std::env::var("XDG_DATA_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => {
                let home = std::env::var("HOME").context("HOME not set")?;
                PathBuf::from(home).join(".local/share")
            }
        };
        Ok(data_dir.join("coachdesk").join("coachdesk.db"))
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| anyhow!("database connection lock poisoned"))?;
            f(&mut conn)
        })
        .await?
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE conversations (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    system_prompt TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    model TEXT,
                    tokens_in BIGINT,
                    tokens_out BIGINT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                CREATE INDEX idx_conversations_updated ON conversations(updated_at DESC);
                CREATE INDEX idx_messages_conversation ON messages(conversation_id);
                CREATE INDEX idx_messages_created ON messages(created_at);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        if version < 2 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                UPDATE schema_version SET version = 2;",
            )?;
        }

        if version < 3 {
            conn.execute_batch(
                "CREATE TABLE action_items (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    completed INTEGER NOT NULL DEFAULT 0,
                    ordinal INTEGER NOT NULL DEFAULT 0,
                    parent_id TEXT,
                    message_id TEXT,
                    conversation_id TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY (parent_id) REFERENCES action_items(id),
                    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE SET NULL,
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE SET NULL
                );

                CREATE TABLE extracted_lists (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    items TEXT NOT NULL DEFAULT '[]',
                    parent_id TEXT,
                    conversation_id TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY (parent_id) REFERENCES extracted_lists(id),
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE SET NULL
                );

                CREATE INDEX idx_action_items_parent ON action_items(parent_id);
                CREATE INDEX idx_action_items_conversation ON action_items(conversation_id);
                CREATE INDEX idx_extracted_lists_parent ON extracted_lists(parent_id);

                UPDATE schema_version SET version = 3;",
            )?;
        }

        if version < 4 {
            conn.execute_batch(
                "CREATE TABLE business_plans (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE plan_sections (
                    id TEXT PRIMARY KEY,
                    plan_id TEXT NOT NULL,
                    section_key TEXT NOT NULL,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    ordinal INTEGER NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (plan_id, section_key),
                    FOREIGN KEY (plan_id) REFERENCES business_plans(id) ON DELETE CASCADE
                );

                CREATE TABLE break_even (
                    conversation_id TEXT PRIMARY KEY,
                    data TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                UPDATE schema_version SET version = 4;",
            )?;
        }

        Ok(())
    }

    // --- Conversation CRUD ---

    pub async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conv = conversation.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, title, system_prompt, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conv.id,
                    conv.title,
                    conv.system_prompt,
                    conv.created_at.to_rfc3339(),
                    conv.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, c.system_prompt, c.created_at, c.updated_at,
                        (SELECT SUBSTR(m.content, 1, 100) FROM messages m WHERE m.conversation_id = c.id ORDER BY m.created_at DESC LIMIT 1) as last_preview
                 FROM conversations c ORDER BY c.updated_at DESC",
            )?;
            let conversations = stmt
                .query_map([], |row| Ok(Self::row_to_conversation(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let id = id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.title, c.system_prompt, c.created_at, c.updated_at,
                        (SELECT SUBSTR(m.content, 1, 100) FROM messages m WHERE m.conversation_id = c.id ORDER BY m.created_at DESC LIMIT 1) as last_preview
                 FROM conversations c WHERE c.id = ?1",
            )?;
            stmt.query_row(params![id], |row| Ok(Self::row_to_conversation(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    pub async fn update_conversation(
        &self,
        id: &str,
        title: Option<&str>,
        system_prompt: Option<Option<&str>>,
    ) -> Result<bool> {
        let id = id.to_string();
        let title = title.map(str::to_string);
        let prompt_changed = system_prompt.is_some();
        let system_prompt = system_prompt.flatten().map(str::to_string);
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET title = COALESCE(?1, title),
                     system_prompt = CASE WHEN ?2 THEN ?3 ELSE system_prompt END,
                     updated_at = ?4
                 WHERE id = ?5",
                params![title, prompt_changed, system_prompt, Utc::now().to_rfc3339(), id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    pub async fn update_conversation_timestamp(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(move |conn| {
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.call(move |conn| {
            let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    // --- Message CRUD ---

    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        let msg = message.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, model, tokens_in, tokens_out, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    msg.id,
                    msg.conversation_id,
                    msg.role.as_str(),
                    msg.content,
                    msg.model,
                    msg.tokens_in,
                    msg.tokens_out,
                    msg.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let id = id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, model, tokens_in, tokens_out, created_at
                 FROM messages WHERE id = ?1",
            )?;
            stmt.query_row(params![id], |row| Ok(Self::row_to_message(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversation_id = conversation_id.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, model, tokens_in, tokens_out, created_at
                 FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )?;
            let messages = stmt
                .query_map(params![conversation_id], |row| {
                    Ok(Self::row_to_message(row))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
    }

    // --- Action items ---

    /// Insert all items in one transaction and return the stored rows.
    pub async fn insert_action_items(&self, items: Vec<NewActionItem>) -> Result<Vec<ActionItem>> {
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let now = Utc::now();
            let mut stored = Vec::with_capacity(items.len());
            for item in items {
                let row = ActionItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    content: item.content,
                    completed: item.completed,
                    ordinal: item.ordinal,
                    parent_id: item.parent_id,
                    message_id: item.message_id,
                    conversation_id: item.conversation_id,
                    created_at: now,
                    updated_at: now,
                };
                tx.execute(
                    "INSERT INTO action_items (id, content, completed, ordinal, parent_id, message_id, conversation_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.id,
                        row.content,
                        row.completed as i32,
                        row.ordinal,
                        row.parent_id,
                        row.message_id,
                        row.conversation_id,
                        row.created_at.to_rfc3339(),
                        row.updated_at.to_rfc3339(),
                    ],
                )?;
                stored.push(row);
            }
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    pub async fn get_action_item(&self, id: &str) -> Result<Option<ActionItem>> {
        let id = id.to_string();
        self.call(move |conn| {
            let sql = format!("SELECT {ACTION_ITEM_COLUMNS} FROM action_items WHERE id = ?1");
            conn.query_row(&sql, params![id], |row| Ok(Self::row_to_action_item(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    pub async fn list_action_items(&self, filter: ItemFilter) -> Result<Vec<ActionItem>> {
        self.call(move |conn| {
            let sql = format!(
                "SELECT {ACTION_ITEM_COLUMNS} FROM action_items
                 WHERE (?1 IS NULL OR conversation_id = ?1)
                   AND (?2 IS NULL OR parent_id = ?2)
                   AND (?3 IS NULL OR message_id = ?3)
                 ORDER BY parent_id IS NOT NULL, parent_id, ordinal, created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map(
                    params![filter.conversation_id, filter.parent_id, filter.message_id],
                    |row| Ok(Self::row_to_action_item(row)),
                )?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
        .await
    }

    /// Next free top-level ordinal for a conversation's items.
    pub async fn next_item_ordinal(&self, conversation_id: &str) -> Result<i64> {
        let conversation_id = conversation_id.to_string();
        self.call(move |conn| {
            let next: i64 = conn.query_row(
                "SELECT COALESCE(MAX(ordinal) + 1, 0) FROM action_items
                 WHERE conversation_id = ?1 AND parent_id IS NULL",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(next)
        })
        .await
    }

    pub async fn update_action_item(
        &self,
        id: &str,
        patch: ActionItemPatch,
    ) -> Result<Option<ActionItem>> {
        let id = id.to_string();
        self.call(move |conn| {
            let parent_changed = patch.parent_id.is_some();
            let parent_id = patch.parent_id.flatten();
            let changed = conn.execute(
                "UPDATE action_items
                 SET content = COALESCE(?1, content),
                     completed = COALESCE(?2, completed),
                     ordinal = COALESCE(?3, ordinal),
                     parent_id = CASE WHEN ?4 THEN ?5 ELSE parent_id END,
                     updated_at = ?6
                 WHERE id = ?7",
                params![
                    patch.content,
                    patch.completed.map(|c| c as i32),
                    patch.ordinal,
                    parent_changed,
                    parent_id,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {ACTION_ITEM_COLUMNS} FROM action_items WHERE id = ?1");
            conn.query_row(&sql, params![id], |row| Ok(Self::row_to_action_item(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    // --- Extracted lists ---

    pub async fn insert_list(&self, input: ListInput) -> Result<ExtractedList> {
        self.call(move |conn| {
            let now = Utc::now();
            let list = ExtractedList {
                id: uuid::Uuid::new_v4().to_string(),
                title: input.title,
                items: input.items,
                parent_id: input.parent_id,
                conversation_id: input.conversation_id,
                created_at: now,
                updated_at: now,
            };
            conn.execute(
                "INSERT INTO extracted_lists (id, title, items, parent_id, conversation_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    list.id,
                    list.title,
                    serde_json::to_string(&list.items)?,
                    list.parent_id,
                    list.conversation_id,
                    list.created_at.to_rfc3339(),
                    list.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(list)
        })
        .await
    }

    pub async fn get_list(&self, id: &str) -> Result<Option<ExtractedList>> {
        let id = id.to_string();
        self.call(move |conn| {
            let sql = format!("SELECT {LIST_COLUMNS} FROM extracted_lists WHERE id = ?1");
            conn.query_row(&sql, params![id], |row| Ok(Self::row_to_list(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    pub async fn list_lists(&self, conversation_id: Option<String>) -> Result<Vec<ExtractedList>> {
        self.call(move |conn| {
            let sql = format!(
                "SELECT {LIST_COLUMNS} FROM extracted_lists
                 WHERE (?1 IS NULL OR conversation_id = ?1)
                 ORDER BY parent_id IS NOT NULL, created_at"
            );
            let mut stmt = conn.prepare(&sql)?;
            let lists = stmt
                .query_map(params![conversation_id], |row| Ok(Self::row_to_list(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lists)
        })
        .await
    }

    pub async fn replace_list(&self, id: &str, input: ListInput) -> Result<Option<ExtractedList>> {
        let id = id.to_string();
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE extracted_lists
                 SET title = ?1, items = ?2, parent_id = ?3, conversation_id = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    input.title,
                    serde_json::to_string(&input.items)?,
                    input.parent_id,
                    input.conversation_id,
                    Utc::now().to_rfc3339(),
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {LIST_COLUMNS} FROM extracted_lists WHERE id = ?1");
            conn.query_row(&sql, params![id], |row| Ok(Self::row_to_list(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    // --- Business plans ---

    pub async fn insert_plan(&self, plan: &BusinessPlan) -> Result<()> {
        let plan = plan.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO business_plans (id, title, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    plan.id,
                    plan.title,
                    plan.description,
                    plan.created_at.to_rfc3339(),
                    plan.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_plans(&self) -> Result<Vec<BusinessPlan>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, created_at, updated_at
                 FROM business_plans ORDER BY updated_at DESC",
            )?;
            let plans = stmt
                .query_map([], |row| Ok(Self::row_to_plan(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(plans)
        })
        .await
    }

    /// Fetch a plan with its sections in catalogue order.
    pub async fn get_plan(&self, id: &str) -> Result<Option<BusinessPlan>> {
        let id = id.to_string();
        self.call(move |conn| {
            let plan = conn
                .query_row(
                    "SELECT id, title, description, created_at, updated_at
                     FROM business_plans WHERE id = ?1",
                    params![id],
                    |row| Ok(Self::row_to_plan(row)),
                )
                .optional()?
                .transpose()?;

            let Some(mut plan) = plan else {
                return Ok(None);
            };

            let sql = format!(
                "SELECT {SECTION_COLUMNS} FROM plan_sections WHERE plan_id = ?1 ORDER BY ordinal"
            );
            let mut stmt = conn.prepare(&sql)?;
            plan.sections = stmt
                .query_map(params![plan.id], |row| Ok(Self::row_to_section(row)))?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(plan))
        })
        .await
    }

    pub async fn delete_plan(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.call(move |conn| {
            let deleted = conn.execute("DELETE FROM business_plans WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    pub async fn upsert_section(
        &self,
        plan_id: &str,
        key: SectionKey,
        content: &str,
    ) -> Result<PlanSection> {
        let plan_id = plan_id.to_string();
        let content = content.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO plan_sections (id, plan_id, section_key, title, content, ordinal, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(plan_id, section_key) DO UPDATE SET content = ?5, updated_at = ?7",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    plan_id,
                    key.as_str(),
                    key.title(),
                    content,
                    key.ordinal(),
                    now,
                ],
            )?;
            tx.execute(
                "UPDATE business_plans SET updated_at = ?1 WHERE id = ?2",
                params![now, plan_id],
            )?;
            let sql = format!(
                "SELECT {SECTION_COLUMNS} FROM plan_sections WHERE plan_id = ?1 AND section_key = ?2"
            );
            let section = tx.query_row(&sql, params![plan_id, key.as_str()], |row| {
                Ok(Self::row_to_section(row))
            })??;
            tx.commit()?;
            Ok(section)
        })
        .await
    }

    // --- Break-even state ---

    pub async fn get_break_even(&self, conversation_id: &str) -> Result<Option<BreakEvenData>> {
        let conversation_id = conversation_id.to_string();
        self.call(move |conn| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT data FROM break_even WHERE conversation_id = ?1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|json| serde_json::from_str(&json).context("Corrupt break-even data"))
                .transpose()
        })
        .await
    }

    pub async fn save_break_even(&self, conversation_id: &str, data: &BreakEvenData) -> Result<()> {
        let conversation_id = conversation_id.to_string();
        let json = serde_json::to_string(data)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO break_even (conversation_id, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id) DO UPDATE SET data = ?2, updated_at = ?3",
                params![conversation_id, json, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.call(move |conn| {
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    // --- Row helpers ---

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
    }

    fn row_to_conversation(row: &rusqlite::Row) -> Result<Conversation> {
        let created_str: String = row.get(3)?;
        let updated_str: String = row.get(4)?;

        Ok(Conversation {
            id: row.get(0)?,
            title: row.get(1)?,
            system_prompt: row.get(2)?,
            last_message_preview: row.get(5)?,
            created_at: Self::parse_timestamp(&created_str)?,
            updated_at: Self::parse_timestamp(&updated_str)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> Result<Message> {
        let role_str: String = row.get(2)?;
        let created_str: String = row.get(7)?;

        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow!("Unknown role: {}", role_str))?,
            content: row.get(3)?,
            model: row.get(4)?,
            tokens_in: row.get(5)?,
            tokens_out: row.get(6)?,
            created_at: Self::parse_timestamp(&created_str)?,
        })
    }

    fn row_to_action_item(row: &rusqlite::Row) -> Result<ActionItem> {
        let completed: i32 = row.get(2)?;
        let created_str: String = row.get(7)?;
        let updated_str: String = row.get(8)?;

        Ok(ActionItem {
            id: row.get(0)?,
            content: row.get(1)?,
            completed: completed != 0,
            ordinal: row.get(3)?,
            parent_id: row.get(4)?,
            message_id: row.get(5)?,
            conversation_id: row.get(6)?,
            created_at: Self::parse_timestamp(&created_str)?,
            updated_at: Self::parse_timestamp(&updated_str)?,
        })
    }

    fn row_to_list(row: &rusqlite::Row) -> Result<ExtractedList> {
        let items_json: String = row.get(2)?;
        let created_str: String = row.get(5)?;
        let updated_str: String = row.get(6)?;

        Ok(ExtractedList {
            id: row.get(0)?,
            title: row.get(1)?,
            items: serde_json::from_str(&items_json).context("Corrupt list items")?,
            parent_id: row.get(3)?,
            conversation_id: row.get(4)?,
            created_at: Self::parse_timestamp(&created_str)?,
            updated_at: Self::parse_timestamp(&updated_str)?,
        })
    }

    fn row_to_plan(row: &rusqlite::Row) -> Result<BusinessPlan> {
        let created_str: String = row.get(3)?;
        let updated_str: String = row.get(4)?;

        Ok(BusinessPlan {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            sections: Vec::new(),
            created_at: Self::parse_timestamp(&created_str)?,
            updated_at: Self::parse_timestamp(&updated_str)?,
        })
    }

    fn row_to_section(row: &rusqlite::Row) -> Result<PlanSection> {
        let key_str: String = row.get(2)?;
        let updated_str: String = row.get(6)?;

        Ok(PlanSection {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            section_key: SectionKey::parse(&key_str)
                .ok_or_else(|| anyhow!("Unknown section key: {}", key_str))?,
            title: row.get(3)?,
            content: row.get(4)?,
            ordinal: row.get(5)?,
            updated_at: Self::parse_timestamp(&updated_str)?,
        })
    }
}
