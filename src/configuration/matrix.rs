use super::{ConfigurationError, CpuName, FlagOverlay, ModelCategory, TestConfiguration};

/// Cross product of model categories and flag overlays for one architecture.
pub struct ConfigurationMatrix;

impl ConfigurationMatrix {
    /// One configuration per overlay, in overlay order.
    pub fn by_overlays(
        overlays: &[FlagOverlay],
        base: &TestConfiguration,
    ) -> Result<Vec<TestConfiguration>, ConfigurationError> {
        overlays.iter().map(|overlay| base.merged(overlay)).collect()
    }

    /// Category-major, overlay-minor. The position of a configuration in the returned
    /// sequence is its test id.
    pub fn build(
        overlays: &[FlagOverlay],
        cpu_name: CpuName,
    ) -> Result<Vec<TestConfiguration>, ConfigurationError> {
        let mut configurations = Vec::with_capacity(ModelCategory::ALL.len() * overlays.len());
        for category in ModelCategory::ALL {
            configurations.extend(Self::by_overlays(
                overlays,
                &category.base_configuration(cpu_name),
            )?);
        }
        Ok(configurations)
    }
}
