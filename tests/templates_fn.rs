use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/templates_fn.ql";

// `doubleOf(21)` deduces T from the argument, `doubleOf[Float]`
// supplies it, and the plain `pick` overload out-costs the template
// specialization.
const EXPECTED: Expected = Expected {
    stdout: "42\n3\n101\n",
    stderr: "",
};

#[test]
fn function_templates_instantiate_and_lose_to_exact_overloads() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
