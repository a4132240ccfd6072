use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/expressions.ql";
const EXPECTED: Expected = Expected {
    stdout: "14\n20\n",
    stderr: "",
};

#[test]
fn run_expressions() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
