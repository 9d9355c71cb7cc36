//! Wire and fixture types for the pet service

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// Which credential fixture to log in with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    #[default]
    Valid,
    Invalid,
}

/// Email/password pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

/// Listing filter accepted by `GET /api/pets`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListFilter {
    /// Every pet on the platform
    #[default]
    All,
    /// Pets created by the authenticated user
    MyPets,
}

impl ListFilter {
    /// Value sent in the `filter` query parameter
    pub fn as_query(self) -> &'static str {
        match self {
            ListFilter::All => "",
            ListFilter::MyPets => "my_pets",
        }
    }
}

impl std::str::FromStr for ListFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(ListFilter::All),
            "my_pets" => Ok(ListFilter::MyPets),
            other => Err(format!("unknown filter '{}', expected 'all' or 'my_pets'", other)),
        }
    }
}

/// Text fields of a pet card as submitted to the service
///
/// Values stay strings so that malformed input reaches the service
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PetFields {
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub animal_type: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub age: String,
}

impl PetFields {
    pub fn new(name: &str, animal_type: &str, age: &str) -> Self {
        Self {
            name: name.to_string(),
            animal_type: animal_type.to_string(),
            age: age.to_string(),
        }
    }

    /// Form/multipart pairs in wire order
    pub fn as_pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("name", self.name.as_str()),
            ("animal_type", self.animal_type.as_str()),
            ("age", self.age.as_str()),
        ]
    }
}

/// A pet card as returned by the service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PetRecord {
    pub id: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub animal_type: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub age: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pet_photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Status and parsed body of one call
///
/// Non-2xx statuses are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// Build from raw body text; non-JSON bodies are kept as a string
    pub fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
        };
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// API key from an authentication response
    pub fn key(&self) -> Option<&str> {
        self.body.get("key").and_then(|k| k.as_str())
    }

    /// Pets array from a listing response
    pub fn pets(&self) -> Option<&Vec<serde_json::Value>> {
        self.body.get("pets").and_then(|p| p.as_array())
    }

    /// Ids of all pets in a listing response, in listing order
    pub fn pet_ids(&self) -> Vec<String> {
        self.pets()
            .map(|pets| pets.iter().filter_map(pet_id).collect())
            .unwrap_or_default()
    }

    /// Pet card from a create/update response
    pub fn pet(&self) -> Option<PetRecord> {
        serde_json::from_value(self.body.clone()).ok()
    }

    /// Look up a value by dotted path (`pets.0.id`)
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        lookup(&self.body, path)
    }
}

/// Id of a pet object, tolerating numeric ids
pub fn pet_id(pet: &serde_json::Value) -> Option<String> {
    match pet.get("id")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Walk a dotted path through objects and arrays
///
/// An empty path is the value itself.
pub fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        serde_json::Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Photo fixture loaded from disk
#[derive(Debug, Clone)]
pub struct Photo {
    pub path: PathBuf,
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Photo {
    /// Read a photo file; the MIME type follows the extension
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::fixture(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::fixture(path, "path has no file name"))?;

        Ok(Self {
            path: path.to_path_buf(),
            mime: mime_for(path),
            file_name,
            bytes,
        })
    }

    /// Multipart part carrying the photo
    pub fn to_part(&self) -> Result<reqwest::multipart::Part> {
        reqwest::multipart::Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(self.mime)
            .map_err(|e| Error::fixture(&self.path, e))
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Accept strings, numbers, booleans or null where a string is expected
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Text(s)) => s,
        Some(Scalar::Int(i)) => i.to_string(),
        Some(Scalar::Float(f)) => f.to_string(),
        Some(Scalar::Bool(b)) => b.to_string(),
        None => String::new(),
    })
}
