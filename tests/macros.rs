use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/macros.ql";

// `twice(21)` expands to `21 + 21` before generation.
const EXPECTED: Expected = Expected {
    stdout: "42\n",
    stderr: "",
};

#[test]
fn macro_call_expands_before_generation() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
