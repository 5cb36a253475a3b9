//! Turnout state: which branch of a three-endpoint piece is traversable.
//!
//! Endpoint 0 of a turnout is the common endpoint. Only the two branch
//! endpoints (1 and 2) can be the active designation; toggling flips
//! between them.

use serde::{Deserialize, Serialize};

use crate::layout::PieceInstance;
use crate::types::Polyline;

/// Endpoint index shared by both routes through a turnout.
pub const COMMON_ENDPOINT: usize = 0;

/// One of the two branch endpoints of a turnout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Branch {
    /// Endpoint 1, the straight route on the built-in turnouts.
    #[default]
    First,
    /// Endpoint 2, the diverging route on the built-in turnouts.
    Second,
}

impl Branch {
    /// Endpoint index of this branch.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }

    /// The branch at endpoint `index`, if it is a branch endpoint.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            1 => Some(Self::First),
            2 => Some(Self::Second),
            _ => None,
        }
    }

    /// The other branch.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// Resolved rails of a turnout split by state, for drawing the active
/// route distinctly from the inactive one.
#[derive(Debug, Clone, Copy)]
pub struct TurnoutBranches<'a> {
    /// Branch currently routed through the common endpoint.
    pub active_branch: Branch,
    /// Points from the common endpoint to the active branch.
    pub active: &'a Polyline,
    /// Points from the common endpoint to the inactive branch.
    pub inactive: &'a Polyline,
}

/// Active and inactive branch point sequences of an annotated turnout.
///
/// Returns `None` for plain pieces and for turnouts that have not been
/// annotated yet.
#[must_use]
pub fn turnout_branches(piece: &PieceInstance) -> Option<TurnoutBranches<'_>> {
    let active_branch = piece.active_branch()?;
    let inactive_branch = active_branch.toggled();
    let active = piece.world_points(COMMON_ENDPOINT, active_branch.index())?;
    let inactive = piece.world_points(COMMON_ENDPOINT, inactive_branch.index())?;
    Some(TurnoutBranches {
        active_branch,
        active,
        inactive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_indices_skip_common() {
        assert_eq!(Branch::First.index(), 1);
        assert_eq!(Branch::Second.index(), 2);
        assert_eq!(Branch::from_index(COMMON_ENDPOINT), None);
        assert_eq!(Branch::from_index(2), Some(Branch::Second));
        assert_eq!(Branch::from_index(3), None);
    }

    #[test]
    fn toggle_flips_between_branches() {
        assert_eq!(Branch::First.toggled(), Branch::Second);
        assert_eq!(Branch::First.toggled().toggled(), Branch::First);
        assert_eq!(Branch::default(), Branch::First);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn branches_follow_turnout_state() {
        use crate::catalog::Catalog;
        use crate::layout::Layout;
        use crate::types::{LayoutConfig, PieceId, Point};

        let mut layout = Layout::new(Catalog::builtin());
        layout.add_piece("lhPoints", 0.0, 0.0).unwrap();
        layout.add_piece("straight20", 20.0, 0.0).unwrap();
        assert!(turnout_branches(&layout.pieces()[0]).is_none());

        let mut prepared = crate::prepare(layout, &LayoutConfig::default()).unwrap();
        let end = |points: &Polyline| *points.last().unwrap();

        let branches = turnout_branches(&prepared.layout().pieces()[0]).unwrap();
        assert_eq!(branches.active_branch, Branch::First);
        assert!(end(branches.active).distance(Point::new(20.0, 0.0)) < 1e-9);
        assert!(end(branches.inactive).distance(Point::new(20.0, -10.0)) < 1e-6);
        assert!(turnout_branches(&prepared.layout().pieces()[1]).is_none());

        prepared.toggle_turnout(PieceId(0)).unwrap();
        let branches = turnout_branches(&prepared.layout().pieces()[0]).unwrap();
        assert_eq!(branches.active_branch, Branch::Second);
        assert!(end(branches.active).distance(Point::new(20.0, -10.0)) < 1e-6);
    }
}
