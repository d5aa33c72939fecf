extern crate build_deps;

fn main() {
    // Scenario files drive the generated golden tests, rebuild when one is added or changed
    build_deps::rerun_if_changed_paths("tests/testdata/*.yaml").unwrap();
    build_deps::rerun_if_changed_paths("tests/testdata").unwrap();
}
