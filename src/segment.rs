//! Segment resolution from recency × frequency scores

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use tracing::info;

use crate::error::{RfmError, RfmResult};
use crate::scoring::{RfmKey, ScoredCustomer};

/// Marketing segments, in rule-table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Hibernating,
    AtRisk,
    CantLoose,
    AboutToSleep,
    NeedAttention,
    LoyalCustomers,
    Promising,
    NewCustomers,
    PotentialLoyalists,
    Champions,
}

impl Segment {
    pub const ALL: [Segment; 10] = [
        Segment::Hibernating,
        Segment::AtRisk,
        Segment::CantLoose,
        Segment::AboutToSleep,
        Segment::NeedAttention,
        Segment::LoyalCustomers,
        Segment::Promising,
        Segment::NewCustomers,
        Segment::PotentialLoyalists,
        Segment::Champions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Hibernating => "hibernating",
            Segment::AtRisk => "at_risk",
            Segment::CantLoose => "cant_loose",
            Segment::AboutToSleep => "about_to_sleep",
            Segment::NeedAttention => "need_attention",
            Segment::LoyalCustomers => "loyal_customers",
            Segment::Promising => "promising",
            Segment::NewCustomers => "new_customers",
            Segment::PotentialLoyalists => "potential_loyalists",
            Segment::Champions => "champions",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Segment::ALL
            .into_iter()
            .find(|segment| segment.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown segment: {}", s))
    }
}

/// Matches keys whose recency and frequency scores fall in the given ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRule {
    pub recency: RangeInclusive<u8>,
    pub frequency: RangeInclusive<u8>,
    pub segment: Segment,
}

impl SegmentRule {
    const fn new(recency: RangeInclusive<u8>, frequency: RangeInclusive<u8>, segment: Segment) -> Self {
        Self {
            recency,
            frequency,
            segment,
        }
    }

    pub fn matches(&self, key: RfmKey) -> bool {
        self.recency.contains(&key.recency.value()) && self.frequency.contains(&key.frequency.value())
    }
}

/// Ordered segment rules. The first matching rule wins.
pub const SEGMENT_RULES: [SegmentRule; 10] = [
    SegmentRule::new(1..=2, 1..=2, Segment::Hibernating),
    SegmentRule::new(1..=2, 3..=4, Segment::AtRisk),
    SegmentRule::new(1..=2, 5..=5, Segment::CantLoose),
    SegmentRule::new(3..=3, 1..=2, Segment::AboutToSleep),
    SegmentRule::new(3..=3, 3..=3, Segment::NeedAttention),
    SegmentRule::new(3..=4, 4..=5, Segment::LoyalCustomers),
    SegmentRule::new(4..=4, 1..=1, Segment::Promising),
    SegmentRule::new(5..=5, 1..=1, Segment::NewCustomers),
    SegmentRule::new(4..=5, 2..=3, Segment::PotentialLoyalists),
    SegmentRule::new(5..=5, 4..=5, Segment::Champions),
];

/// A scored customer with its resolved segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedCustomer {
    pub scored: ScoredCustomer,
    pub segment: Segment,
}

impl SegmentedCustomer {
    pub fn customer_id(&self) -> i64 {
        self.scored.metrics.customer_id
    }
}

/// Resolve a key against an arbitrary ordered rule table
pub fn resolve_with(rules: &[SegmentRule], key: RfmKey) -> RfmResult<Segment> {
    rules
        .iter()
        .find(|rule| rule.matches(key))
        .map(|rule| rule.segment)
        .ok_or_else(|| RfmError::UnmatchedSegmentKey(key.to_string()))
}

/// Resolve a key against [`SEGMENT_RULES`]
pub fn resolve_segment(key: RfmKey) -> RfmResult<Segment> {
    resolve_with(&SEGMENT_RULES, key)
}

/// Attach a segment to every scored customer
pub fn segment_customers(scored: Vec<ScoredCustomer>) -> RfmResult<Vec<SegmentedCustomer>> {
    let segmented = scored
        .into_iter()
        .map(|scored| {
            let segment = resolve_segment(scored.rfm_key)?;
            Ok(SegmentedCustomer { scored, segment })
        })
        .collect::<RfmResult<Vec<_>>>()?;

    info!(customers = segmented.len(), "Assigned segments");
    Ok(segmented)
}
