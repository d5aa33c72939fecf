use std::env;
use std::fs::File;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

use api::{AccountKey, ServiceAccountSpec};
use irsactl::filter::filter_existing;
use irsactl::models::{ExistenceState, Mode};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestCase {
    name: String,
    #[serde(default)]
    override_existing: bool,
    #[serde(default)]
    role_only: bool,
    desired: Vec<ServiceAccountSpec>,
    #[serde(default)]
    existing: ExistenceState,
    expected: Expected,
}

#[derive(Debug, Serialize, Deserialize)]
struct Expected {
    mode: Mode,
    targets: Vec<AccountKey>,
    skipped: Vec<AccountKey>,
}

#[test_resources("irsactl/tests/testdata/*.yaml")]
fn test_filter_existing(resource: PathBuf) {
    let cwd = env::current_dir().unwrap();
    let full_path = cwd.parent().expect("Could not find parent").join(resource);
    let f = File::open(full_path).expect("Could not open file.");
    let case: TestCase = serde_yaml::from_reader(f).expect("Could not read test case.");
    println!("Running {}", case.name);

    let filtered = filter_existing(&case.desired, &case.existing, case.override_existing);
    let targets: Vec<AccountKey> = filtered.targets.iter().map(|sa| sa.key()).collect();

    assert_eq!(Mode::select(case.role_only, case.override_existing), case.expected.mode);
    assert_eq!(targets, case.expected.targets);
    assert_eq!(filtered.skipped(), case.expected.skipped);
    assert_eq!(targets.len() + filtered.skipped().len(), case.desired.len());
}
