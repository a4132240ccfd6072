use std::{error::Error, path::Path};

use test_utils::{check_failing_run, check_run, Expected};

#[test]
fn import_splices_definitions() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/programs/import_ok.ql"),
        Expected {
            stdout: "42\n",
            stderr: "",
        },
    )
}

#[test]
fn import_cycle_is_detected() -> Result<(), Box<dyn Error>> {
    let stderr = check_failing_run(Path::new("./tests/programs/import_cycle_a.ql"))?;
    assert!(
        stderr.contains("cycle"),
        "stderr should mention the cycle: {stderr}"
    );
    // A single import-failure notice, not one per revisit.
    assert_eq!(stderr.matches("S2006").count(), 1, "{stderr}");
    Ok(())
}

#[test]
fn unresolved_name_fails_the_build() -> Result<(), Box<dyn Error>> {
    let stderr = check_failing_run(Path::new("./tests/programs/name_error.ql"))?;
    assert!(stderr.contains("missing_name"), "{stderr}");
    Ok(())
}
