mod common;

use std::path::Path;

use dlk_harness::{
    context::RunContext,
    remote::{RemoteError, RemoteTarget, RemoteValidator, REMOTE_SCRIPT_NAME},
    validation::ToleranceVerdict,
};

use common::fake_tool;

/// A context whose ssh and scp are local scripts. `ssh_body` decides what the "board" prints.
fn bridge(tools: &Path, ssh_body: &str, scp_body: &str) -> RemoteValidator {
    let remote = RemoteTarget {
        ssh: fake_tool(tools, "ssh", ssh_body).display().to_string(),
        scp: fake_tool(tools, "scp", scp_body).display().to_string(),
        ..RemoteTarget::default().with_host("de10nano")
    };
    let ctx = RunContext::builder()
        .dlk_root(tools)
        .remote(remote)
        .build()
        .unwrap();
    RemoteValidator::new(&ctx)
}

fn run(validator: &RemoteValidator, out: &Path) -> Result<ToleranceVerdict, RemoteError> {
    validator.validate_remote(
        out,
        Path::new("/x/lib_arm_fpga.so"),
        Path::new("/x/000_images_placeholder:0.npy"),
        Path::new("/x/133_output:0.npy"),
    )
}

#[test]
fn numeric_output_is_the_verdict() {
    let tools = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let validator = bridge(
        tools.path(),
        "case \"$2\" in cd*) echo 0.0625 ;; esac",
        "exit 0",
    );
    let verdict = run(&validator, out.path()).unwrap();
    assert_eq!(verdict.percent_failed(), 0.0625);
    assert!(out.path().join(REMOTE_SCRIPT_NAME).is_file());
    assert!(out.path().join("remote.out").is_file());
}

#[test]
fn unparsable_output_counts_as_total_failure() {
    let tools = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let validator = bridge(
        tools.path(),
        "case \"$2\" in cd*) echo 'Traceback (most recent call last):'; echo 'OSError: lib' ;; esac",
        "exit 0",
    );
    assert_eq!(run(&validator, out.path()).unwrap(), ToleranceVerdict::WORST);
}

#[test]
fn failing_copy_is_an_error_not_a_verdict() {
    let tools = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let validator = bridge(tools.path(), "exit 0", "echo 'lost connection' >&2; exit 1");
    assert!(matches!(
        run(&validator, out.path()),
        Err(RemoteError::Tool { step: "copy", .. })
    ));
}
