use crate::feed::types::{ProsumerKind, ProsumerSnapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub production: f64,
    pub consumption: f64,
}

/// Sums `power` per kind over the latest snapshot only. Unknown kinds are
/// left out.
pub fn aggregate(snapshot: &ProsumerSnapshot) -> Totals {
    snapshot
        .records()
        .fold(Totals::default(), |mut totals, record| {
            match record.kind {
                ProsumerKind::Producer => totals.production += record.power,
                ProsumerKind::Consumer => totals.consumption += record.power,
                ProsumerKind::Other(_) => {}
            }
            totals
        })
}
