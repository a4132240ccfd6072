use std::{error::Error, path::Path};

use test_utils::{check_run, Expected};

const SRC_PATH: &str = "./tests/programs/bridge.ql";

// `bridge IO : M;` grafts M's members under the name IO for qualified
// lookup.
const EXPECTED: Expected = Expected {
    stdout: "42\n",
    stderr: "",
};

#[test]
fn bridge_grafts_module_members() -> Result<(), Box<dyn Error>> {
    check_run(Path::new(SRC_PATH), EXPECTED)
}
