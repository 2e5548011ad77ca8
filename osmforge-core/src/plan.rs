//! Insert planning for ways that may become lines, polygons, or both.
//!
//! Full import and incremental update must reach the exact same decision
//! for a (way, table) pair, so the decision is a small explicit state
//! rather than booleans scattered across the two drivers.

/// What the pipeline inserts for one (way, table) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertDecision {
    /// The way matched no rule for this table.
    NotConsidered,
    /// Insert a LineString row only.
    LineOnly,
    /// Insert a Polygon row only.
    PolygonOnly,
    /// Closed way matching both line and polygon rules without an `area`
    /// tag: insert both rows with the identical tag snapshot.
    Both,
    /// A relation already produced the equivalent polygon from this way;
    /// direct insertion into this table is suppressed.
    SuppressedByRelation,
}

impl InsertDecision {
    /// `true` when a LineString row is inserted.
    #[must_use]
    pub fn inserts_line(self) -> bool {
        matches!(self, Self::LineOnly | Self::Both)
    }

    /// `true` when a Polygon row is inserted.
    #[must_use]
    pub fn inserts_polygon(self) -> bool {
        matches!(self, Self::PolygonOnly | Self::Both)
    }
}

/// Decide what a way contributes to one table.
///
/// `area_tag` is the way's own `area` value: `yes` forces polygon-only
/// output on a closed way, `no` forces line-only. `suppressed` marks ways
/// whose geometry a matching relation already inserted into this table.
#[must_use]
pub fn way_decision(
    closed: bool,
    area_tag: Option<&str>,
    line_match: bool,
    polygon_match: bool,
    suppressed: bool,
) -> InsertDecision {
    if suppressed {
        return InsertDecision::SuppressedByRelation;
    }
    if !closed {
        return if line_match {
            InsertDecision::LineOnly
        } else {
            InsertDecision::NotConsidered
        };
    }
    let line_match = line_match && area_tag != Some("yes");
    let polygon_match = polygon_match && area_tag != Some("no");
    match (line_match, polygon_match) {
        (true, true) => InsertDecision::Both,
        (true, false) => InsertDecision::LineOnly,
        (false, true) => InsertDecision::PolygonOnly,
        (false, false) => InsertDecision::NotConsidered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(true, None, true, true, InsertDecision::Both)]
    #[case(true, Some("yes"), true, true, InsertDecision::PolygonOnly)]
    #[case(true, Some("no"), true, true, InsertDecision::LineOnly)]
    #[case(true, None, false, true, InsertDecision::PolygonOnly)]
    #[case(false, None, true, true, InsertDecision::LineOnly)]
    #[case(false, None, false, true, InsertDecision::NotConsidered)]
    #[case(true, Some("no"), false, true, InsertDecision::NotConsidered)]
    fn area_tag_steers_dual_output(
        #[case] closed: bool,
        #[case] area: Option<&str>,
        #[case] line: bool,
        #[case] polygon: bool,
        #[case] expected: InsertDecision,
    ) {
        assert_eq!(way_decision(closed, area, line, polygon, false), expected);
    }

    #[rstest]
    fn relation_suppression_wins_over_matches() {
        let decision = way_decision(true, None, true, true, true);
        assert_eq!(decision, InsertDecision::SuppressedByRelation);
        assert!(!decision.inserts_line());
        assert!(!decision.inserts_polygon());
    }
}
