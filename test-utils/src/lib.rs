use std::{
    error::Error,
    io,
    path::Path,
    process::{Command, Output},
    str,
};

const QUILL_PATH: &str = "./target/debug/quill";

pub struct Expected<'a> {
    pub stdout: &'a str,
    pub stderr: &'a str,
}

impl<'a> Expected<'a> {
    fn assert_matches(self, output: &Output) -> Result<(), Box<dyn Error>> {
        assert_eq!(str::from_utf8(&output.stdout)?, self.stdout);
        assert_eq!(str::from_utf8(&output.stderr)?, self.stderr);
        Ok(())
    }
}

fn run_quill(src_path: &Path) -> Result<Output, io::Error> {
    Command::new(QUILL_PATH).arg("run").arg(src_path).output()
}

/// Run a Quill program through the driver and assert its exact output.
pub fn check_run(src_path: &Path, expected: Expected) -> Result<(), Box<dyn Error>> {
    let output = run_quill(src_path)?;

    expected.assert_matches(&output)?;
    assert!(
        output.status.success(),
        "quill exited with status {:?}",
        output.status.code()
    );

    Ok(())
}

/// Run a Quill program expected to fail; returns its stderr for
/// content assertions.
pub fn check_failing_run(src_path: &Path) -> Result<String, Box<dyn Error>> {
    let output = run_quill(src_path)?;

    println!("{output:?}");
    assert!(
        !output.status.success(),
        "quill should exit with a nonzero status"
    );

    Ok(str::from_utf8(&output.stderr)?.to_owned())
}
