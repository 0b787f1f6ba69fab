use crate::models::NewActionItem;

/// Turn extracted candidates into top-level item rows owned by a message.
///
/// Ordinals are sequential from `start_ordinal`. Items are not grouped or
/// nested; every candidate becomes a sibling.
pub fn normalize(
    candidates: Vec<String>,
    message_id: Option<&str>,
    conversation_id: Option<&str>,
    start_ordinal: i64,
) -> Vec<NewActionItem> {
    candidates
        .into_iter()
        .zip(start_ordinal..)
        .map(|(content, ordinal)| NewActionItem {
            content,
            completed: false,
            ordinal,
            parent_id: None,
            message_id: message_id.map(str::to_string),
            conversation_id: conversation_id.map(str::to_string),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_sequential_from_zero() {
        let rows = normalize(
            vec!["Buy supplies".into(), "Hire a baker".into()],
            Some("m1"),
            Some("c1"),
            0,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ordinal, 0);
        assert_eq!(rows[1].ordinal, 1);
        assert_eq!(rows[1].message_id.as_deref(), Some("m1"));
        assert_eq!(rows[1].conversation_id.as_deref(), Some("c1"));
        assert!(rows.iter().all(|r| r.parent_id.is_none() && !r.completed));
    }

    #[test]
    fn test_start_offset_appends_after_existing() {
        let rows = normalize(vec!["Open a bank account".into()], None, None, 5);
        assert_eq!(rows[0].ordinal, 5);
    }
}
