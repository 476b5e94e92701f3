use std::collections::HashSet;

use powledger_storage::Column;

#[test]
fn column_index_matches_position() {
    for (position, column) in Column::ALL.into_iter().enumerate() {
        assert_eq!(column.index(), position, "{column:?}");
    }
}

#[test]
fn partition_names_are_distinct() {
    let names: HashSet<&str> = Column::ALL.into_iter().map(Column::as_str).collect();
    assert_eq!(names.len(), Column::ALL.len());
}
