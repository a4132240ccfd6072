use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/loops.ql";
const EXPECTED: Expected = Expected {
    stdout: "20\n",
    stderr: "",
};

#[test]
fn run_loops_with_break_and_continue() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
