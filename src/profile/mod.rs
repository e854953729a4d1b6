//! Declarative soak-test catalog.
//!
//! A catalog is a TOML document of named step sequences plus profiles that
//! wire those sequences into test plans. Loading resolves every reference up
//! front, so the run loop only ever sees flat, immutable [`Step`] lists.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

use crate::channel::{AppTarget, KeyCode, LaunchCategory};

const BUILTIN_CATALOG: &str = include_str!("builtin.toml");

const APP_LAUNCH_SETTLE: Duration = Duration::from_secs(30);
const ACTIVITY_LAUNCH_SETTLE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum TestType {
    Zapping,
    Navigation,
    Apps,
    StandbyWake,
    Volume,
}

impl TestType {
    pub const ALL: [TestType; 5] = [
        TestType::Zapping,
        TestType::Navigation,
        TestType::Apps,
        TestType::StandbyWake,
        TestType::Volume,
    ];

    /// Identifier used in catalog files and on the command line.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Zapping => "zapping",
            Self::Navigation => "navigation",
            Self::Apps => "apps",
            Self::StandbyWake => "standby-wake",
            Self::Volume => "volume",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Zapping => "Zapping",
            Self::Navigation => "Navigation",
            Self::Apps => "Apps",
            Self::StandbyWake => "Standby/Wake-up",
            Self::Volume => "Volume Control",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for TestType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.slug() == s)
            .ok_or_else(|| CatalogError::UnknownTestType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Key(KeyCode),
    Launch(AppTarget),
}

/// One atomic action with its pauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    /// Pause before dispatch.
    pub lead_in: Duration,
    /// Pause after a successful dispatch.
    pub settle: Duration,
}

impl Step {
    pub fn key(key: KeyCode) -> Self {
        Self {
            action: Action::Key(key),
            lead_in: key.default_lead_in(),
            settle: key.default_settle(),
        }
    }

    pub fn launch(app: AppTarget) -> Self {
        let settle = if app.activity.is_some() {
            ACTIVITY_LAUNCH_SETTLE
        } else {
            APP_LAUNCH_SETTLE
        };
        Self {
            action: Action::Launch(app),
            lead_in: Duration::ZERO,
            settle,
        }
    }

    pub fn with_lead_in(mut self, lead_in: Duration) -> Self {
        self.lead_in = lead_in;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Name used in the run transcript.
    pub fn describe(&self) -> &str {
        match &self.action {
            Action::Key(key) => key.label(),
            Action::Launch(app) => &app.label,
        }
    }
}

/// Everything needed to run one test of one profile.
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub profile: String,
    pub test: TestType,
    pub initializer: Vec<Step>,
    pub steps: Vec<Step>,
    /// Replayed after a reconnection; the first step is the critical one.
    pub reinitializer: Vec<Step>,
    /// Wait out low-power states before each step.
    pub check_standby: bool,
}

impl TestPlan {
    /// Transcript label used when the operator supplies none.
    pub fn default_log_label(&self) -> String {
        format!("log_{}_{}", self.test.slug().replace('-', "_"), self.profile)
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub title: String,
    tests: BTreeMap<TestType, TestPlan>,
}

impl Profile {
    pub fn tests(&self) -> impl Iterator<Item = &TestPlan> {
        self.tests.values()
    }

    pub fn test(&self, test: TestType) -> Option<&TestPlan> {
        self.tests.get(&test)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown test type '{0}' (expected one of zapping, navigation, apps, standby-wake, volume)")]
    UnknownTestType(String),
    #[error("profile '{profile}' references unknown sequence '{sequence}'")]
    UnknownSequence { profile: String, sequence: String },
    #[error("profile '{profile}' test '{test}' has no steps")]
    EmptySteps { profile: String, test: TestType },
    #[error("sequence '{sequence}' has a step with repeat = 0")]
    ZeroRepeat { sequence: String },
    #[error("duplicate profile '{0}'")]
    DuplicateProfile(String),
    #[error("unknown profile '{0}'")]
    UnknownProfile(String),
    #[error("profile '{profile}' has no '{test}' test")]
    UnknownTest { profile: String, test: TestType },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    sequences: BTreeMap<String, Vec<RawStep>>,
    #[serde(default, rename = "profile")]
    profiles: Vec<RawProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Key {
        key: KeyCode,
        #[serde(default = "default_repeat")]
        repeat: u32,
        lead_in_secs: Option<u64>,
        settle_secs: Option<u64>,
    },
    App {
        app: String,
        activity: Option<String>,
        #[serde(default)]
        category: LaunchCategory,
        label: Option<String>,
        lead_in_secs: Option<u64>,
        settle_secs: Option<u64>,
    },
}

fn default_repeat() -> u32 {
    1
}

fn default_check_standby() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    name: String,
    #[serde(default)]
    title: Option<String>,
    /// Reinitializer for tests that do not name their own.
    #[serde(default)]
    reinitializer: Option<String>,
    #[serde(default)]
    tests: BTreeMap<String, RawTest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTest {
    #[serde(default)]
    initializer: Option<String>,
    steps: String,
    #[serde(default)]
    reinitializer: Option<String>,
    #[serde(default = "default_check_standby")]
    check_standby: bool,
}

fn expand(name: &str, raw: &[RawStep]) -> Result<Vec<Step>, CatalogError> {
    let mut steps = Vec::new();
    for entry in raw {
        match entry {
            RawStep::Key {
                key,
                repeat,
                lead_in_secs,
                settle_secs,
            } => {
                if *repeat == 0 {
                    return Err(CatalogError::ZeroRepeat {
                        sequence: name.to_string(),
                    });
                }
                let step = apply_overrides(Step::key(*key), *lead_in_secs, *settle_secs);
                steps.extend(std::iter::repeat_n(step, *repeat as usize));
            }
            RawStep::App {
                app,
                activity,
                category,
                label,
                lead_in_secs,
                settle_secs,
            } => {
                let target = AppTarget {
                    package: app.clone(),
                    activity: activity.clone(),
                    category: *category,
                    label: label.clone().unwrap_or_else(|| app.clone()),
                };
                steps.push(apply_overrides(
                    Step::launch(target),
                    *lead_in_secs,
                    *settle_secs,
                ));
            }
        }
    }
    Ok(steps)
}

fn apply_overrides(mut step: Step, lead_in_secs: Option<u64>, settle_secs: Option<u64>) -> Step {
    if let Some(secs) = lead_in_secs {
        step = step.with_lead_in(Duration::from_secs(secs));
    }
    if let Some(secs) = settle_secs {
        step = step.with_settle(Duration::from_secs(secs));
    }
    step
}

/// All profiles available to the operator.
#[derive(Debug, Clone)]
pub struct Catalog {
    profiles: Vec<Profile>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    /// Load a catalog file, or the built-in one when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read catalog {}", path.display()))?;
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to load catalog {}", path.display()))
            }
            None => Self::builtin().context("built-in catalog is invalid"),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = toml::from_str(contents)?;

        let mut sequences = BTreeMap::new();
        for (name, entries) in &raw.sequences {
            sequences.insert(name.as_str(), expand(name, entries)?);
        }

        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(raw.profiles.len());
        for profile in raw.profiles {
            if !seen.insert(profile.name.clone()) {
                return Err(CatalogError::DuplicateProfile(profile.name));
            }

            let lookup = |name: &str| -> Result<Vec<Step>, CatalogError> {
                sequences
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CatalogError::UnknownSequence {
                        profile: profile.name.clone(),
                        sequence: name.to_string(),
                    })
            };

            let mut tests = BTreeMap::new();
            for (slug, test) in &profile.tests {
                let test_type: TestType = slug.parse()?;
                let steps = lookup(&test.steps)?;
                if steps.is_empty() {
                    return Err(CatalogError::EmptySteps {
                        profile: profile.name.clone(),
                        test: test_type,
                    });
                }
                let initializer = match &test.initializer {
                    Some(name) => lookup(name)?,
                    None => Vec::new(),
                };
                let reinitializer = match test
                    .reinitializer
                    .as_deref()
                    .or(profile.reinitializer.as_deref())
                {
                    Some(name) => lookup(name)?,
                    None => Vec::new(),
                };
                tests.insert(
                    test_type,
                    TestPlan {
                        profile: profile.name.clone(),
                        test: test_type,
                        initializer,
                        steps,
                        reinitializer,
                        check_standby: test.check_standby,
                    },
                );
            }

            profiles.push(Profile {
                title: profile.title.clone().unwrap_or_else(|| profile.name.clone()),
                name: profile.name,
                tests,
            });
        }

        Ok(Self { profiles })
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, CatalogError> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CatalogError::UnknownProfile(name.to_string()))
    }

    pub fn plan(&self, profile: &str, test: TestType) -> Result<&TestPlan, CatalogError> {
        self.profile(profile)?
            .test(test)
            .ok_or_else(|| CatalogError::UnknownTest {
                profile: profile.to_string(),
                test,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(Step::describe).collect()
    }

    #[test]
    fn builtin_catalog_has_three_profiles_with_five_tests() {
        let catalog = Catalog::builtin().unwrap();
        let names: Vec<_> = catalog.profiles().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["project1", "project2", "project3"]);
        for profile in catalog.profiles() {
            for test in TestType::ALL {
                assert!(
                    profile.test(test).is_some(),
                    "{} is missing {test}",
                    profile.name
                );
            }
        }
    }

    #[test]
    fn project1_zapping_uses_guide_reinitializer() {
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project1", TestType::Zapping).unwrap();
        assert_eq!(
            keys(&plan.reinitializer),
            vec!["KEY_HOME", "KEY_GUIDE", "KEY_BACK"]
        );
        assert_eq!(
            keys(&plan.initializer),
            vec!["KEY_HOME", "KEY_GUIDE", "KEY_OK", "KEY_BACK"]
        );
        assert_eq!(plan.initializer[3].lead_in, Duration::from_secs(15));

        let other = catalog.plan("project2", TestType::Zapping).unwrap();
        assert_eq!(keys(&other.reinitializer), vec!["KEY_HOME"]);
    }

    #[test]
    fn standby_wake_keeps_generic_reinitializer_everywhere() {
        let catalog = Catalog::builtin().unwrap();
        for profile in catalog.profiles() {
            let plan = profile.test(TestType::StandbyWake).unwrap();
            assert!(!plan.check_standby);
            assert!(plan.initializer.is_empty());
            assert_eq!(keys(&plan.reinitializer), vec!["KEY_HOME"]);
            assert_eq!(keys(&plan.steps), vec!["KEY_STANDBY", "KEY_WAKEUP"]);
        }
    }

    #[test]
    fn zapping_steps_and_live_tv_initializer() {
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project3", TestType::Zapping).unwrap();
        assert_eq!(
            keys(&plan.steps),
            vec![
                "KEY_CHANNEL_UP",
                "KEY_CHANNEL_UP",
                "KEY_CHANNEL_DOWN",
                "KEY_CHANNEL_UP",
                "KEY_CHANNEL_DOWN"
            ]
        );
        assert!(plan.steps.iter().all(|s| s.lead_in == Duration::from_secs(20)));

        let flow = &plan.initializer[2];
        match &flow.action {
            Action::Launch(app) => {
                assert_eq!(app.package, "ar.com.flow.androidtv_stb");
                assert!(app.activity.is_some());
                assert_eq!(app.category, LaunchCategory::LeanbackLauncher);
            }
            other => panic!("expected app launch, got {other:?}"),
        }
        assert_eq!(flow.lead_in, Duration::from_secs(5));
        assert_eq!(flow.settle, Duration::from_secs(15));
    }

    #[test]
    fn navigation_tables_keep_their_length() {
        let catalog = Catalog::builtin().unwrap();
        let len = |p| catalog.plan(p, TestType::Navigation).unwrap().steps.len();
        assert_eq!(len("project1"), 82);
        assert_eq!(len("project2"), 77);
        assert_eq!(len("project3"), 194);
        assert!(
            catalog
                .plan("project2", TestType::Navigation)
                .unwrap()
                .initializer
                .is_empty()
        );
    }

    #[test]
    fn apps_alternate_home_and_launch() {
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project1", TestType::Apps).unwrap();
        assert_eq!(plan.steps.len(), 12);
        for pair in plan.steps.chunks(2) {
            assert_eq!(pair[0].action, Action::Key(KeyCode::Home));
            assert!(matches!(pair[1].action, Action::Launch(_)));
            assert_eq!(pair[1].settle, Duration::from_secs(30));
        }
        assert_eq!(plan.steps[3].describe(), "Amazon Prime");
    }

    #[test]
    fn volume_sequence_expands_repeats() {
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project2", TestType::Volume).unwrap();
        assert_eq!(plan.steps.len(), 20);
        assert_eq!(plan.steps[0].settle, Duration::from_secs(3));
    }

    #[test]
    fn rejects_unknown_sequence_reference() {
        let err = Catalog::from_toml(
            r#"
[sequences]
a = [{ key = "HOME" }]

[[profile]]
name = "lab"

[profile.tests.zapping]
steps = "missing"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownSequence { .. }));
    }

    #[test]
    fn rejects_empty_step_list_and_unknown_test() {
        let empty = Catalog::from_toml(
            r#"
[sequences]
none = []

[[profile]]
name = "lab"

[profile.tests.volume]
steps = "none"
"#,
        )
        .unwrap_err();
        assert!(matches!(empty, CatalogError::EmptySteps { .. }));

        let unknown = Catalog::from_toml(
            r#"
[sequences]
a = [{ key = "HOME" }]

[[profile]]
name = "lab"

[profile.tests.dancing]
steps = "a"
"#,
        )
        .unwrap_err();
        assert!(matches!(unknown, CatalogError::UnknownTestType(_)));
    }

    #[test]
    fn rejects_zero_repeat_and_duplicate_profiles() {
        let zero = Catalog::from_toml(
            r#"
[sequences]
a = [{ key = "HOME", repeat = 0 }]
"#,
        )
        .unwrap_err();
        assert!(matches!(zero, CatalogError::ZeroRepeat { .. }));

        let dup = Catalog::from_toml(
            r#"
[sequences]
a = [{ key = "HOME" }]

[[profile]]
name = "lab"
[profile.tests.apps]
steps = "a"

[[profile]]
name = "lab"
"#,
        )
        .unwrap_err();
        assert!(matches!(dup, CatalogError::DuplicateProfile(_)));
    }

    #[test]
    fn step_overrides_apply() {
        let catalog = Catalog::from_toml(
            r#"
[sequences]
a = [{ key = "OK", lead_in_secs = 2, settle_secs = 9 }, { app = "org.example.tv" }]

[[profile]]
name = "lab"
title = "Lab rack"
[profile.tests.apps]
steps = "a"
"#,
        )
        .unwrap();
        let profile = catalog.profile("lab").unwrap();
        assert_eq!(profile.title, "Lab rack");
        let plan = profile.test(TestType::Apps).unwrap();
        assert_eq!(plan.steps[0].lead_in, Duration::from_secs(2));
        assert_eq!(plan.steps[0].settle, Duration::from_secs(9));
        assert_eq!(plan.steps[1].describe(), "org.example.tv");
        assert!(plan.reinitializer.is_empty());
        assert!(plan.check_standby);
    }

    #[test]
    fn missing_profile_and_test_lookup_errors() {
        let catalog = Catalog::builtin().unwrap();
        assert!(matches!(
            catalog.profile("project9"),
            Err(CatalogError::UnknownProfile(_))
        ));
    }

    #[test]
    fn default_log_label_names_test_and_profile() {
        let catalog = Catalog::builtin().unwrap();
        let plan = catalog.plan("project2", TestType::StandbyWake).unwrap();
        assert_eq!(plan.default_log_label(), "log_standby_wake_project2");
    }

    #[test]
    fn test_type_round_trips_through_slug() {
        for test in TestType::ALL {
            assert_eq!(test.slug().parse::<TestType>().unwrap(), test);
        }
    }

    #[test]
    fn load_reads_catalog_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.toml");
        std::fs::write(
            &path,
            "[sequences]\na = [{ key = \"MUTE\" }]\n[[profile]]\nname = \"x\"\n[profile.tests.volume]\nsteps = \"a\"\n",
        )
        .unwrap();
        let catalog = Catalog::load(Some(&path)).unwrap();
        assert_eq!(catalog.profiles().len(), 1);
        assert!(Catalog::load(None).is_ok());
    }
}
