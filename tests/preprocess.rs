use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/preprocess.ql";

// The preprocess block inserts `x := 1;` into the enclosing scope at
// compile time; the compiled program reads the definition it left
// behind.
const EXPECTED: Expected = Expected {
    stdout: "1\n",
    stderr: "",
};

#[test]
fn preprocess_block_mutates_ast() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
