use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/destructors.ql";

// Early return destroys the two initialized locals in reverse order;
// the fall-through path destroys all three.
const EXPECTED: Expected = Expected {
    stdout: "dtor 2\ndtor 1\n--\ndtor 3\ndtor 2\ndtor 1\n",
    stderr: "",
};

#[test]
fn destructors_respect_exit_paths() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
