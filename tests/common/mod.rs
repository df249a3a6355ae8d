#![allow(dead_code)]

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use dlk_harness::{configuration::TestConfiguration, context::RunContext};

/// Writes an executable `sh` script into `dir`.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// A tar that lists the golden marker, a cmake and a make that print their success markers.
/// `make` also creates the library it is asked for.
pub struct FakeToolchain {
    pub tar: PathBuf,
    pub cmake: PathBuf,
    pub make: PathBuf,
}

impl FakeToolchain {
    pub fn install(dir: &Path, library_name: &str) -> Self {
        Self {
            // $2 is the archive path: strip directory and .tar.gz to find the set name.
            tar: fake_tool(
                dir,
                "tar",
                "set=$(basename \"$2\" .tar.gz)\nmkdir -p \"$4/$set\"\necho \"$set/raw_image.npy\"",
            ),
            cmake: fake_tool(dir, "cmake", "echo \"-- $*\"\necho '-- Generating done'"),
            make: fake_tool(
                dir,
                "make",
                &format!("echo 'Building CXX object'\ntouch {library_name}"),
            ),
        }
    }

    pub fn context(&self, dlk_root: &Path, build_root: &Path) -> RunContext {
        RunContext::builder()
            .dlk_root(dlk_root)
            .build_root(build_root.to_path_buf())
            .tar(self.tar.display().to_string())
            .cmake(self.cmake.display().to_string())
            .make(self.make.display().to_string())
            .build()
            .unwrap()
    }
}

/// Creates the model directory and an (empty) golden archive for `config` under `dlk_root`.
pub fn install_model(dlk_root: &Path, config: &TestConfiguration) {
    let model_dir = dlk_root.join(&config.model_path);
    std::fs::create_dir_all(&model_dir).unwrap();
    std::fs::write(
        model_dir.join(format!("{}.tar.gz", config.expected_output_set_name)),
        b"",
    )
    .unwrap();
}
