use std::collections::HashSet;

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::services::database::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeTable {
    ActionItems,
    ExtractedLists,
}

impl TreeTable {
    fn table(&self) -> &'static str {
        match self {
            TreeTable::ActionItems => "action_items",
            TreeTable::ExtractedLists => "extracted_lists",
        }
    }

    fn child_order(&self) -> &'static str {
        match self {
            TreeTable::ActionItems => "ordinal, created_at",
            TreeTable::ExtractedLists => "created_at",
        }
    }

    pub fn noun(&self) -> &'static str {
        match self {
            TreeTable::ActionItems => "Action item",
            TreeTable::ExtractedLists => "List",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    NotFound,
    /// Refused: the node has children and cascading was not requested.
    HasChildren { children: usize },
    Deleted { removed: usize },
}

fn exists(conn: &Connection, table: TreeTable, id: &str) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table.table());
    Ok(conn
        .query_row(&sql, params![id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn child_ids(conn: &Connection, table: TreeTable, id: &str) -> rusqlite::Result<Vec<String>> {
    let sql = format!(
        "SELECT id FROM {} WHERE parent_id = ?1 ORDER BY {}",
        table.table(),
        table.child_order()
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Every node below `id`, parents before their children.
pub fn descendant_ids(
    conn: &Connection,
    table: TreeTable,
    id: &str,
) -> rusqlite::Result<Vec<String>> {
    let mut result = Vec::new();
    let mut seen = HashSet::from([id.to_string()]);
    let mut to_visit = vec![id.to_string()];

    while let Some(current) = to_visit.pop() {
        for child in child_ids(conn, table, &current)? {
            if seen.insert(child.clone()) {
                to_visit.push(child.clone());
                result.push(child);
            }
        }
    }

    Ok(result)
}

/// Children-first deletion order for the subtree rooted at `id`.
fn post_order(
    conn: &Connection,
    table: TreeTable,
    id: &str,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) -> rusqlite::Result<()> {
    if !seen.insert(id.to_string()) {
        return Ok(());
    }
    for child in child_ids(conn, table, id)? {
        post_order(conn, table, &child, seen, out)?;
    }
    out.push(id.to_string());
    Ok(())
}

/// Delete a node, cascading to its descendants only when asked to.
///
/// Runs in a single transaction: either the whole subtree goes or nothing does.
pub async fn delete_tree(
    db: &Database,
    table: TreeTable,
    id: &str,
    delete_children: bool,
) -> Result<DeleteOutcome> {
    let id = id.to_string();
    let outcome = db
        .call(move |conn| {
            let tx = conn.transaction()?;

            if !exists(&tx, table, &id)? {
                return Ok(DeleteOutcome::NotFound);
            }

            let children = child_ids(&tx, table, &id)?;
            if !children.is_empty() && !delete_children {
                return Ok(DeleteOutcome::HasChildren {
                    children: children.len(),
                });
            }

            let mut order = Vec::new();
            post_order(&tx, table, &id, &mut HashSet::new(), &mut order)?;

            let sql = format!("DELETE FROM {} WHERE id = ?1", table.table());
            let mut removed = 0;
            {
                let mut stmt = tx.prepare(&sql)?;
                for node in &order {
                    removed += stmt.execute(params![node])?;
                }
            }
            tx.commit()?;
            Ok(DeleteOutcome::Deleted { removed })
        })
        .await?;

    if let DeleteOutcome::Deleted { removed } = &outcome {
        tracing::info!(table = table.table(), removed, "deleted tree");
    }
    Ok(outcome)
}

/// Whether re-parenting `id` under `new_parent` would put it below itself.
pub async fn would_create_cycle(
    db: &Database,
    table: TreeTable,
    id: &str,
    new_parent: &str,
) -> Result<bool> {
    if id == new_parent {
        return Ok(true);
    }
    let id = id.to_string();
    let new_parent = new_parent.to_string();
    db.call(move |conn| {
        let below = descendant_ids(conn, table, &id)?;
        Ok(below.contains(&new_parent))
    })
    .await
}

pub async fn node_exists(db: &Database, table: TreeTable, id: &str) -> Result<bool> {
    let id = id.to_string();
    db.call(move |conn| Ok(exists(conn, table, &id)?)).await
}
