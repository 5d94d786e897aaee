//! Outcomes of successful write operations.

use bson::Bson;

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertResult {
    /// The document's `_id`, generated if the document had none.
    pub inserted_id: Bson,
}

/// Result of `insert_many`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyResult {
    /// The `_id` of each inserted document, in input order.
    pub inserted_ids: Vec<Bson>,
}

/// Result of `update_one` and `update_many`.
///
/// `matched` counts documents satisfying the filter; `modified` counts those whose
/// content actually changed. An update that leaves a matched document as it was
/// is reported as `matched: 1, modified: 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

/// Result of `delete_one` and `delete_many`. Zero is a normal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub deleted: u64,
}
