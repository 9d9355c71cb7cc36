//! Test suite configuration types
//!
//! Defines the data structures for deserializing YAML test suites: one
//! declarative table of scenarios, each tagged as a positive or negative
//! case.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::client::{CredentialKind, ListFilter, PetFields};
use crate::common::paths;
use crate::common::{Error, Result};

/// Suite file shipped with the harness
pub const DEFAULT_SUITE: &str = "suites/petfriends.yaml";

/// A complete suite loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct TestSuite {
    /// Name of the suite
    pub name: String,
    /// Optional description of what the suite covers
    pub description: Option<String>,
    /// Pet created when a dependent step finds nothing to work on
    #[serde(default)]
    pub seed_pet: SeedPet,
    /// The scenario table; assertions are written as single-key maps
    #[serde(deserialize_with = "serde_yaml::with::singleton_map_recursive::deserialize")]
    pub scenarios: Vec<TestScenario>,
    /// Directory fixtures resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Fixture used to synthesize a missing pet
#[derive(Deserialize, Debug, Clone)]
pub struct SeedPet {
    #[serde(default = "default_seed_fields")]
    pub fields: PetFields,
    /// Optional photo, relative to the suite file
    pub photo: Option<PathBuf>,
}

impl Default for SeedPet {
    fn default() -> Self {
        Self {
            fields: default_seed_fields(),
            photo: None,
        }
    }
}

fn default_seed_fields() -> PetFields {
    PetFields::new("Суперкот", "кот", "3")
}

/// Whether the service is expected to accept or reject the scenario
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    #[default]
    Positive,
    Negative,
}

impl std::fmt::Display for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expectation::Positive => f.write_str("positive"),
            Expectation::Negative => f.write_str("negative"),
        }
    }
}

/// How the scenario obtains its session
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Log in with the valid credential fixture before the first step
    #[default]
    Valid,
    /// No implicit login; the steps authenticate themselves
    #[serde(rename = "none")]
    Skip,
}

/// A single end-to-end test case
#[derive(Deserialize, Debug)]
pub struct TestScenario {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    #[serde(default)]
    pub expect: Expectation,
    #[serde(default)]
    pub auth: AuthMode,
    /// Step whose acceptance decides a negative scenario
    pub subject: Option<String>,
    /// Response fields compared against the submission to detect an echo
    pub echo_fields: Option<Vec<String>>,
    /// The sequence of API actions
    pub steps: Vec<TestStep>,
    /// Checks run once all steps have executed
    #[serde(default)]
    pub asserts: Vec<Assertion>,
}

/// One API action, optionally named so later steps can refer to it
#[derive(Deserialize, Debug)]
pub struct TestStep {
    pub id: Option<String>,
    #[serde(flatten)]
    pub action: StepAction,
}

/// API actions a step can perform
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Request an API key
    Authenticate {
        #[serde(default)]
        credentials: CredentialKind,
    },
    /// List pets, optionally re-reading until a condition holds
    ListPets {
        #[serde(default)]
        filter: ListFilter,
        until: Option<Assertion>,
    },
    /// Create a pet, with a photo when one is given
    CreatePet {
        #[serde(default)]
        fields: PetFields,
        photo: Option<PathBuf>,
    },
    /// Replace the text fields of an existing pet
    UpdatePet {
        pet: PetRef,
        #[serde(default)]
        fields: PetFields,
    },
    /// Replace the photo of an existing pet
    UpdatePhoto { pet: PetRef, photo: PathBuf },
    /// Delete an existing pet
    DeletePet { pet: PetRef },
}

impl StepAction {
    /// Action name as written in suite files
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Authenticate { .. } => "authenticate",
            StepAction::ListPets { .. } => "list_pets",
            StepAction::CreatePet { .. } => "create_pet",
            StepAction::UpdatePet { .. } => "update_pet",
            StepAction::UpdatePhoto { .. } => "update_photo",
            StepAction::DeletePet { .. } => "delete_pet",
        }
    }

    fn pet_ref(&self) -> Option<&PetRef> {
        match self {
            StepAction::UpdatePet { pet, .. }
            | StepAction::UpdatePhoto { pet, .. }
            | StepAction::DeletePet { pet } => Some(pet),
            _ => None,
        }
    }

    fn touches_own_pets(&self) -> bool {
        match self {
            StepAction::ListPets { filter, .. } => *filter == ListFilter::MyPets,
            StepAction::Authenticate { .. } => false,
            StepAction::CreatePet { .. }
            | StepAction::UpdatePet { .. }
            | StepAction::UpdatePhoto { .. }
            | StepAction::DeletePet { .. } => true,
        }
    }
}

/// Reference to a pet produced by an earlier step
#[derive(Deserialize, Debug, Clone)]
pub struct PetRef {
    /// Step id: a listing (pick by index) or a create/update step
    pub step: String,
    /// Position in the listing
    #[serde(default)]
    pub index: usize,
    /// Create the seed pet when the reference comes up empty
    #[serde(default)]
    pub synthesize: bool,
}

/// Value inside a recorded response
#[derive(Deserialize, Debug, Clone)]
pub struct ValueRef {
    pub step: String,
    /// Select the listed pet whose id is the pet id of this step
    pub pet_of: Option<String>,
    /// Dotted path; empty means the whole body (or pet)
    #[serde(default)]
    pub path: String,
}

impl std::fmt::Display for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.pet_of {
            Some(pet_of) => write!(f, "{}[pet of {}].{}", self.step, pet_of, self.path),
            None => write!(f, "{}.{}", self.step, self.path),
        }
    }
}

/// Assertion evaluated against recorded step outputs
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum Assertion {
    /// Status code checks
    Status {
        step: String,
        equals: Option<u16>,
        not: Option<u16>,
        success: Option<bool>,
    },
    /// Field exists and is not null
    HasField { step: String, path: String },
    /// Field is missing or null
    LacksField { step: String, path: String },
    /// Value is a non-empty string, array or object
    NonEmpty { value: ValueRef },
    /// Value equals a literal
    Equals {
        value: ValueRef,
        expected: serde_json::Value,
    },
    /// Two recorded values are equal
    Matches { left: ValueRef, right: ValueRef },
    /// Listing holds at least `count` pets
    MinPets { step: String, count: usize },
    /// Listing contains the pet another step produced
    PetPresent { step: String, pet_of: String },
    /// Listing does not contain the pet another step produced
    PetAbsent { step: String, pet_of: String },
    /// Two listings hold the same set of ids
    SameIds { left: String, right: String },
    /// Every listed pet has the owner of the pet another step produced
    OnlyOwnPets { step: String, pet_of: String },
}

impl Assertion {
    /// Step ids this assertion reads
    pub fn steps(&self) -> Vec<&str> {
        match self {
            Assertion::Status { step, .. }
            | Assertion::HasField { step, .. }
            | Assertion::LacksField { step, .. }
            | Assertion::MinPets { step, .. } => vec![step.as_str()],
            Assertion::PetPresent { step, pet_of }
            | Assertion::PetAbsent { step, pet_of }
            | Assertion::OnlyOwnPets { step, pet_of } => vec![step.as_str(), pet_of.as_str()],
            Assertion::SameIds { left, right } => vec![left.as_str(), right.as_str()],
            Assertion::NonEmpty { value } | Assertion::Equals { value, .. } => {
                value_ref_steps(value)
            }
            Assertion::Matches { left, right } => {
                let mut steps = value_ref_steps(left);
                steps.extend(value_ref_steps(right));
                steps
            }
        }
    }
}

fn value_ref_steps(value: &ValueRef) -> Vec<&str> {
    let mut steps = vec![value.step.as_str()];
    if let Some(pet_of) = &value.pet_of {
        steps.push(pet_of.as_str());
    }
    steps
}

impl TestScenario {
    /// Key under which a step's output is recorded
    pub fn step_key(&self, index: usize) -> String {
        self.steps[index]
            .id
            .clone()
            .unwrap_or_else(|| format!("step{}", index + 1))
    }

    /// Whether the scenario lists or mutates the session's own pets
    pub fn touches_own_pets(&self) -> bool {
        self.steps.iter().any(|s| s.action.touches_own_pets())
    }

    /// Check internal references
    fn validate(&self) -> std::result::Result<(), String> {
        if self.steps.is_empty() {
            return Err(format!("scenario '{}' has no steps", self.name));
        }

        let mut declared: HashSet<String> = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            if let Some(pet) = step.action.pet_ref() {
                if !declared.contains(&pet.step) {
                    return Err(format!(
                        "scenario '{}': step {} refers to '{}' before it runs",
                        self.name,
                        i + 1,
                        pet.step
                    ));
                }
            }

            let key = self.step_key(i);
            if let StepAction::ListPets { until: Some(until), .. } = &step.action {
                for referenced in until.steps() {
                    if referenced != key && !declared.contains(referenced) {
                        return Err(format!(
                            "scenario '{}': wait condition of step '{}' refers to unknown step '{}'",
                            self.name, key, referenced
                        ));
                    }
                }
            }

            if !declared.insert(key.clone()) {
                return Err(format!(
                    "scenario '{}': duplicate step id '{}'",
                    self.name, key
                ));
            }
        }

        for assertion in &self.asserts {
            for referenced in assertion.steps() {
                if !declared.contains(referenced) {
                    return Err(format!(
                        "scenario '{}': assertion refers to unknown step '{}'",
                        self.name, referenced
                    ));
                }
            }
        }

        match (self.expect, &self.subject) {
            (Expectation::Negative, None) => Err(format!(
                "negative scenario '{}' needs a 'subject' step",
                self.name
            )),
            (_, Some(subject)) if !declared.contains(subject) => Err(format!(
                "scenario '{}': subject '{}' is not a step id",
                self.name, subject
            )),
            _ => Ok(()),
        }
    }
}

impl TestSuite {
    /// Load a suite from a YAML file; fixtures resolve next to it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content, &paths::suite_dir(path)).map_err(|e| match e {
            Error::SuiteParse { reason, .. } => Error::suite(path, reason),
            other => other,
        })
    }

    /// Parse a suite from YAML text with an explicit fixture directory
    pub fn from_yaml(content: &str, base_dir: &Path) -> Result<Self> {
        let mut suite: TestSuite =
            serde_yaml::from_str(content).map_err(|e| Error::suite("<inline>", e))?;
        suite.base_dir = base_dir.to_path_buf();
        suite.validate()?;
        Ok(suite)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if !names.insert(scenario.name.as_str()) {
                return Err(Error::suite(
                    "<inline>",
                    format!("duplicate scenario name '{}'", scenario.name),
                ));
            }
            scenario
                .validate()
                .map_err(|reason| Error::suite("<inline>", reason))?;
        }
        Ok(())
    }

    /// Absolute location of a fixture named in this suite
    pub fn fixture(&self, path: &Path) -> PathBuf {
        paths::resolve_fixture(&self.base_dir, path)
    }
}
