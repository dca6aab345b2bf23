//! Resolution ladder: the largest tier a bitrate can afford

use crate::config::LadderTier;
use crate::domain::model::Resolution;

/// Bitrate-gated resolution tiers, kept sorted from largest to smallest
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionLadder {
    tiers: Vec<LadderTier>,
}

impl ResolutionLadder {
    pub fn new(mut tiers: Vec<LadderTier>) -> Self {
        tiers.sort_by(|a, b| b.max_long_edge.cmp(&a.max_long_edge));
        Self { tiers }
    }

    /// Longest edge of the largest tier whose bitrate requirement is met.
    ///
    /// Falls back to the smallest tier when none qualifies.
    pub fn long_edge_for(&self, bitrate_bps: u64) -> Option<u32> {
        self.tiers
            .iter()
            .find(|tier| bitrate_bps >= tier.min_bitrate_bps)
            .or_else(|| self.tiers.last())
            .map(|tier| tier.max_long_edge)
    }

    /// Fit `source` into the tier for `bitrate_bps`, preserving aspect ratio
    /// and never upscaling. Dimensions are rounded down to even values.
    pub fn select(&self, source: Resolution, bitrate_bps: u64) -> Resolution {
        let source_edge = source.longest_edge();
        let tier_edge = self.long_edge_for(bitrate_bps).unwrap_or(source_edge);
        if tier_edge >= source_edge {
            return source.even_floor();
        }
        source.fit_long_edge(tier_edge)
    }

    pub fn tiers(&self) -> &[LadderTier] {
        &self.tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetConfig;

    fn ladder() -> ResolutionLadder {
        ResolutionLadder::new(BudgetConfig::default().ladder)
    }

    fn res(width: u32, height: u32) -> Resolution {
        Resolution::new(width, height).unwrap()
    }

    #[test]
    fn test_tier_breakpoints() {
        let ladder = ladder();
        assert_eq!(ladder.long_edge_for(8_000_000), Some(1920));
        assert_eq!(ladder.long_edge_for(2_000_000), Some(1920));
        assert_eq!(ladder.long_edge_for(1_999_999), Some(1280));
        assert_eq!(ladder.long_edge_for(1_000_000), Some(1280));
        assert_eq!(ladder.long_edge_for(600_000), Some(960));
        assert_eq!(ladder.long_edge_for(599_999), Some(854));
    }

    #[test]
    fn test_unsorted_tiers_are_ordered() {
        let mut tiers = BudgetConfig::default().ladder;
        tiers.reverse();
        let ladder = ResolutionLadder::new(tiers);
        assert_eq!(ladder.tiers()[0].max_long_edge, 1920);
        assert_eq!(ladder.long_edge_for(1_500_000), Some(1280));
    }

    #[test]
    fn test_landscape_and_portrait_downscale() {
        let ladder = ladder();
        assert_eq!(ladder.select(res(3840, 2160), 8_000_000), res(1920, 1080));
        assert_eq!(ladder.select(res(1080, 1920), 1_200_000), res(720, 1280));
    }

    #[test]
    fn test_never_upscales() {
        let ladder = ladder();
        assert_eq!(ladder.select(res(640, 360), 8_000_000), res(640, 360));
        assert_eq!(ladder.select(res(641, 361), 8_000_000), res(640, 360));
    }
}
