//! Rack placement records.

use serde::{Deserialize, Serialize};

use crate::id::{FractureId, RackAssignmentId, RackId, ReplicaGroupId};

/// Exclusive ownership of a rack by one replica group for one fracture.
///
/// For a given fracture each rack is owned by at most one replica group.
/// This keeps buddy traffic within a rack and bounds the blast radius of
/// a rack failure to a single group. The repository enforces exclusivity
/// on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RackAssignment {
    /// Unique assignment identifier.
    pub id: RackAssignmentId,
    /// The fracture this assignment scopes.
    pub fracture_id: FractureId,
    /// The rack being assigned.
    pub rack_id: RackId,
    /// The group that owns the rack for this fracture.
    pub group_id: ReplicaGroupId,
}

impl RackAssignment {
    /// Creates a new assignment with an unassigned id.
    #[must_use]
    pub const fn new(fracture_id: FractureId, rack_id: RackId, group_id: ReplicaGroupId) -> Self {
        Self {
            id: RackAssignmentId::UNASSIGNED,
            fracture_id,
            rack_id,
            group_id,
        }
    }
}
