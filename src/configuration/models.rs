use serde::{Deserialize, Serialize};

use super::{CpuName, TestConfiguration};

pub const DEFAULT_INPUT_NAME: &str = "000_images_placeholder:0.npy";

/// The four model families every architecture is tested against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelCategory {
    Classification,
    ClassificationResnet,
    ObjectDetection,
    Segmentation,
}

impl ModelCategory {
    /// Enumeration order of the configuration matrix.
    pub const ALL: [ModelCategory; 4] = [
        ModelCategory::Classification,
        ModelCategory::ClassificationResnet,
        ModelCategory::ObjectDetection,
        ModelCategory::Segmentation,
    ];

    pub fn model_path(self) -> &'static str {
        match self {
            ModelCategory::Classification => {
                "examples/classification/lmnet_quantize_cifar10_space_to_depth"
            }
            ModelCategory::ClassificationResnet => "examples/classification/resnet_quantize_cifar10",
            ModelCategory::ObjectDetection => "examples/object_detection/fyolo_quantize_4_v4",
            ModelCategory::Segmentation => "examples/segmentation/lm_segnet_v1_quantize_camvid",
        }
    }

    pub fn expected_output_set_name(self) -> &'static str {
        match self {
            ModelCategory::Classification => "1000_dog.png",
            ModelCategory::ClassificationResnet => "9984_horse.png",
            ModelCategory::ObjectDetection | ModelCategory::Segmentation => "network_input_output",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            ModelCategory::Classification => "cls",
            ModelCategory::ClassificationResnet => "cls_resnet",
            ModelCategory::ObjectDetection => "det",
            ModelCategory::Segmentation => "seg",
        }
    }

    pub fn output_npy_name(self) -> &'static str {
        match self {
            ModelCategory::Classification => "133_output:0.npy",
            ModelCategory::ClassificationResnet => "368_output:0.npy",
            ModelCategory::ObjectDetection => "317_output:0.npy",
            ModelCategory::Segmentation => "227_output:0.npy",
        }
    }

    /// Base configuration for this model on the given CPU.
    pub fn base_configuration(self, cpu_name: CpuName) -> TestConfiguration {
        TestConfiguration {
            model_path: self.model_path().into(),
            expected_output_set_name: self.expected_output_set_name().to_string(),
            prefix: self.prefix().to_string(),
            input_name: DEFAULT_INPUT_NAME.to_string(),
            output_npy_name: self.output_npy_name().to_string(),
            cpu_name,
            hard_quantize: true,
            threshold_skipping: false,
            cache_dma: false,
            use_avx: false,
            use_run_test_script: false,
            from_npy: false,
            need_arm_compiler: false,
            max_percent_incorrect_values: super::DEFAULT_MAX_PERCENT_INCORRECT,
            test_level: None,
        }
    }
}
