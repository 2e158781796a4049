//! Hint provider abstraction.

use async_trait::async_trait;
use barpath_common::error::BarpathResult;
use barpath_motion_model::{CalibrationHint, RegionHint, RgbaFrame};

/// Source of advisory hints for a reference frame.
///
/// `Ok(None)` means the provider looked and found nothing; `Err` means it
/// could not look at all. Both are non-fatal to callers.
#[async_trait]
pub trait HintProvider: Send + Sync {
    /// Propose a region around the barbell.
    async fn detect_region(&self, frame: &RgbaFrame) -> BarpathResult<Option<RegionHint>>;

    /// Propose a calibration scale.
    async fn detect_calibration(&self, frame: &RgbaFrame)
        -> BarpathResult<Option<CalibrationHint>>;

    /// Whether the provider can currently serve requests.
    async fn is_available(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Provider that returns preset hints. Useful for replaying a known scene.
#[derive(Debug, Clone, Default)]
pub struct FixedHintProvider {
    pub region: Option<RegionHint>,
    pub calibration: Option<CalibrationHint>,
}

impl FixedHintProvider {
    pub fn new(region: Option<RegionHint>, calibration: Option<CalibrationHint>) -> Self {
        Self {
            region,
            calibration,
        }
    }
}

#[async_trait]
impl HintProvider for FixedHintProvider {
    async fn detect_region(&self, frame: &RgbaFrame) -> BarpathResult<Option<RegionHint>> {
        Ok(self.region.map(|hint| {
            RegionHint::new(
                hint.region.clamp_to(frame.width(), frame.height()),
                hint.confidence,
            )
        }))
    }

    async fn detect_calibration(
        &self,
        _frame: &RgbaFrame,
    ) -> BarpathResult<Option<CalibrationHint>> {
        Ok(self.calibration.clone())
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barpath_motion_model::Region;

    #[tokio::test]
    async fn test_fixed_provider_clamps_region_to_frame() {
        let provider = FixedHintProvider::new(
            Some(RegionHint::new(Region::new(50.0, 50.0, 200.0, 200.0), 0.9)),
            None,
        );
        let frame = RgbaFrame::solid(100, 80, [0, 0, 0, 255]).unwrap();
        let hint = provider.detect_region(&frame).await.unwrap().unwrap();
        assert_eq!(hint.region, Region::new(50.0, 50.0, 50.0, 30.0));
        assert!(provider.detect_calibration(&frame).await.unwrap().is_none());
    }
}
