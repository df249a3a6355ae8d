use std::path::{Path, PathBuf};

use crate::{configuration::TestConfiguration, context::RunContext};

pub const FROZEN_GRAPH_NAME: &str = "minimal_graph_with_shape.pb";
pub const GOLDEN_ARCHIVE_EXTENSION: &str = "tar.gz";
/// Entry every golden archive contains; its presence in the extraction log proves the archive unpacked.
pub const GOLDEN_MARKER_ENTRY: &str = "raw_image.npy";

/// Every path belonging to one configuration, derived from its fields and test id alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub artifact_dir: PathBuf,
    pub model_dir: PathBuf,
    pub input_graph: PathBuf,
    pub golden_archive: PathBuf,
    pub golden_dir: PathBuf,
    pub project_dir: PathBuf,
    pub library: PathBuf,
    pub input_tensor: PathBuf,
    pub golden_tensor: PathBuf,
}

/// `{test_id}_{prefix}_{model_basename}_{cpu_name}`
pub fn artifact_dir_name(test_id: usize, config: &TestConfiguration) -> String {
    let model_basename = config
        .model_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    [
        test_id.to_string(),
        config.prefix.clone(),
        model_basename,
        config.cpu_name.to_string(),
    ]
    .join("_")
}

impl ArtifactPaths {
    pub fn resolve(
        ctx: &RunContext,
        suite_dir: &Path,
        test_id: usize,
        config: &TestConfiguration,
    ) -> Self {
        let artifact_dir = suite_dir.join(artifact_dir_name(test_id, config));
        let model_dir = ctx.in_dlk_root(&config.model_path);
        let set = &config.expected_output_set_name;
        let golden_dir = artifact_dir.join(set);
        let project_dir = artifact_dir.join(format!("{}.prj", ctx.project_name));

        Self {
            input_graph: model_dir.join(FROZEN_GRAPH_NAME),
            golden_archive: model_dir.join(format!("{set}.{GOLDEN_ARCHIVE_EXTENSION}")),
            library: project_dir.join(config.cpu_name.library_file_name()),
            input_tensor: golden_dir.join(&config.input_name),
            golden_tensor: golden_dir.join(&config.output_npy_name),
            artifact_dir,
            model_dir,
            golden_dir,
            project_dir,
        }
    }

    /// Path of the archive entry the extraction log must mention.
    pub fn golden_marker(config: &TestConfiguration) -> String {
        format!("{}/{GOLDEN_MARKER_ENTRY}", config.expected_output_set_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{CpuName, ModelCategory};

    #[test]
    fn paths_follow_the_naming_convention() {
        let ctx = RunContext::builder().dlk_root("/dlk").build().unwrap();
        let config = ModelCategory::ObjectDetection.base_configuration(CpuName::ArmFpga);
        let paths = ArtifactPaths::resolve(&ctx, Path::new("/out/suite"), 9, &config);

        assert_eq!(
            paths.artifact_dir,
            PathBuf::from("/out/suite/9_det_fyolo_quantize_4_v4_arm_fpga")
        );
        assert_eq!(
            paths.input_graph,
            PathBuf::from("/dlk/examples/object_detection/fyolo_quantize_4_v4/minimal_graph_with_shape.pb")
        );
        assert_eq!(
            paths.golden_archive,
            PathBuf::from("/dlk/examples/object_detection/fyolo_quantize_4_v4/network_input_output.tar.gz")
        );
        assert_eq!(
            paths.library,
            PathBuf::from("/out/suite/9_det_fyolo_quantize_4_v4_arm_fpga/code_generation.prj/lib_arm_fpga.so")
        );
        assert_eq!(
            paths.golden_tensor,
            PathBuf::from("/out/suite/9_det_fyolo_quantize_4_v4_arm_fpga/network_input_output/317_output:0.npy")
        );
        assert_eq!(
            ArtifactPaths::golden_marker(&config),
            "network_input_output/raw_image.npy"
        );
    }

    #[test]
    fn distinct_ids_never_share_a_directory() {
        let config = ModelCategory::Classification.base_configuration(CpuName::X86_64);
        assert_ne!(artifact_dir_name(0, &config), artifact_dir_name(1, &config));
    }
}
