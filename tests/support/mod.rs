//! In-process mock of the PetFriends service
//!
//! Serves the same routes as the real API on an ephemeral port. The
//! [`Behavior`] decides how invalid input is treated so the harness can be
//! checked against a well-behaved, a buggy and a sanitizing service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Form, Json, Router};
use serde_json::json;
use tokio::task::JoinHandle;

pub const EMAIL: &str = "tester@example.com";
pub const PASSWORD: &str = "secret";
pub const KEY: &str = "ea738148a1f19838e1c5d1413877f3691a3731380e733e877b0ae729";

const OWNER: &str = "tester";

/// How the mock treats invalid input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    /// Rejects bad input with 400 and unknown accounts with 403
    #[default]
    Strict,
    /// Accepts everything and stores it as sent
    Lax,
    /// Accepts everything but replaces invalid values
    Sanitize,
}

#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    pub behavior: Behavior,
    /// Pause before answering listings
    pub list_delay: Option<Duration>,
    /// Listings after a mutation that still show the old state
    pub stale_reads: usize,
    /// Pets owned by someone else, visible in the unfiltered listing
    pub foreign_pets: usize,
    /// Ignore the `my_pets` filter and list everyone's pets
    pub leak_my_pets: bool,
    /// Pause before answering `create_pet_simple`
    pub create_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
struct Pet {
    id: String,
    owner: String,
    name: String,
    animal_type: String,
    age: String,
    pet_photo: String,
}

impl Pet {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "animal_type": self.animal_type,
            "age": self.age,
            "pet_photo": self.pet_photo,
            "user_id": self.owner,
            "created_at": "1700000000.0",
        })
    }
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    pets: Vec<Pet>,
    snapshot: Vec<Pet>,
    stale_left: usize,
    requests: Vec<String>,
}

impl Store {
    fn insert(
        &mut self,
        owner: &str,
        name: String,
        animal_type: String,
        age: String,
        pet_photo: String,
    ) -> Pet {
        self.next_id += 1;
        let pet = Pet {
            id: format!("pet-{:04}", self.next_id),
            owner: owner.to_string(),
            name,
            animal_type,
            age,
            pet_photo,
        };
        // newest first, like the real listing
        self.pets.insert(0, pet.clone());
        pet
    }

    fn own_mut(&mut self, id: &str) -> Option<&mut Pet> {
        self.pets.iter_mut().find(|p| p.id == id && p.owner == OWNER)
    }
}

#[derive(Clone)]
struct AppState {
    options: Arc<MockOptions>,
    store: Arc<Mutex<Store>>,
}

impl AppState {
    fn behavior(&self) -> Behavior {
        self.options.behavior
    }

    fn log(&self, line: String) {
        self.store.lock().unwrap().requests.push(line);
    }

    /// Called before every mutation so stale reads see the prior state
    fn begin_mutation(&self, store: &mut Store) {
        if self.options.stale_reads > 0 {
            store.snapshot = store.pets.clone();
            store.stale_left = self.options.stale_reads;
        }
    }
}

/// A running mock server, stopped on drop
pub struct MockService {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
    handle: JoinHandle<()>,
}

impl MockService {
    pub async fn start(behavior: Behavior) -> Self {
        Self::start_with(MockOptions {
            behavior,
            foreign_pets: 1,
            ..MockOptions::default()
        })
        .await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let mut store = Store::default();
        for i in 0..options.foreign_pets {
            store.insert(
                "someone-else",
                format!("Чужой {}", i + 1),
                "пёс".to_string(),
                "7".to_string(),
                String::new(),
            );
        }
        let store = Arc::new(Mutex::new(store));
        let state = AppState {
            options: Arc::new(options),
            store: store.clone(),
        };

        let app = Router::new()
            .route("/api/key", get(get_key))
            .route("/api/pets", get(list_pets).post(create_pet))
            .route("/api/create_pet_simple", post(create_pet_simple))
            .route("/api/pets/{id}", put(update_pet).delete(delete_pet))
            .route("/api/pets/set_photo/{id}", post(set_photo))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("mock address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self {
            addr,
            store,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `METHOD /path` of every request served so far
    pub fn requests(&self) -> Vec<String> {
        self.store.lock().unwrap().requests.clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }

    /// Ids of the tester's own pets
    pub fn own_pet_ids(&self) -> Vec<String> {
        self.store
            .lock()
            .unwrap()
            .pets
            .iter()
            .filter(|p| p.owner == OWNER)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Insert a pet for the tester directly
    pub fn add_own_pet(&self, name: &str) -> String {
        let mut store = self.store.lock().unwrap();
        store
            .insert(OWNER, name.to_string(), "кот".to_string(), "1".to_string(), String::new())
            .id
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type Rejection = (StatusCode, String);

fn forbidden() -> Rejection {
    (
        StatusCode::FORBIDDEN,
        "<h1>Forbidden</h1><p>Please provide 'auth_key' Header</p>".to_string(),
    )
}

fn bad_request(reason: &str) -> Rejection {
    (StatusCode::BAD_REQUEST, format!("<h1>Bad Request</h1><p>{}</p>", reason))
}

fn authorize(headers: &HeaderMap) -> Result<(), Rejection> {
    match headers.get("auth_key").and_then(|v| v.to_str().ok()) {
        Some(KEY) => Ok(()),
        _ => Err(forbidden()),
    }
}

async fn get_key(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.log("GET /api/key".to_string());
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let valid = header("email") == EMAIL && header("password") == PASSWORD;
    if valid || state.behavior() == Behavior::Lax {
        Json(json!({ "key": KEY })).into_response()
    } else {
        (
            StatusCode::FORBIDDEN,
            "This user wasn't found in database".to_string(),
        )
            .into_response()
    }
}

async fn list_pets(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, Rejection> {
    state.log("GET /api/pets".to_string());
    if let Some(delay) = state.options.list_delay {
        tokio::time::sleep(delay).await;
    }
    authorize(&headers)?;

    let mut store = state.store.lock().unwrap();
    let pets = if store.stale_left > 0 {
        store.stale_left -= 1;
        store.snapshot.clone()
    } else {
        store.pets.clone()
    };
    let mine = match query.get("filter").map(String::as_str) {
        None | Some("") => false,
        Some("my_pets") => !state.options.leak_my_pets,
        Some(other) => return Err(bad_request(&format!("Filter value is incorrect: {}", other))),
    };
    let pets: Vec<serde_json::Value> = pets
        .iter()
        .filter(|p| !mine || p.owner == OWNER)
        .map(Pet::to_json)
        .collect();
    Ok(Json(json!({ "pets": pets })).into_response())
}

/// Text fields after validation, or the rejection
fn accept_fields(
    behavior: Behavior,
    fields: &HashMap<String, String>,
) -> Result<(String, String, String), Rejection> {
    let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
    let (mut name, mut animal_type, mut age) = (get("name"), get("animal_type"), get("age"));
    let age_ok = age.trim().parse::<u32>().is_ok();

    match behavior {
        Behavior::Strict => {
            if name.is_empty() || animal_type.is_empty() || age.is_empty() {
                return Err(bad_request("Provided data is incorrect"));
            }
            if !age_ok {
                return Err(bad_request("Age must be a number"));
            }
        }
        Behavior::Lax => {}
        Behavior::Sanitize => {
            if name.is_empty() {
                name = "Unnamed".to_string();
            }
            if animal_type.is_empty() {
                animal_type = "unknown".to_string();
            }
            if !age_ok {
                age = "0".to_string();
            }
        }
    }
    Ok((name, animal_type, age))
}

struct Upload {
    file_name: String,
    content_type: String,
    size: usize,
}

/// Stored photo reference, or the rejection
fn accept_photo(behavior: Behavior, id: &str, upload: &Upload) -> Result<String, Rejection> {
    let supported = matches!(upload.content_type.as_str(), "image/jpeg" | "image/png");
    if supported || behavior == Behavior::Lax {
        Ok(format!(
            "data:{};name={};size={};pet={}",
            upload.content_type, upload.file_name, upload.size, id
        ))
    } else if behavior == Behavior::Sanitize {
        Ok(String::new())
    } else {
        Err(bad_request("Photo must be JPG, JPEG or PNG"))
    }
}

async fn read_multipart(
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, Option<Upload>), Rejection> {
    let mut fields = HashMap::new();
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "pet_photo" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| bad_request(&e.to_string()))?;
            upload = Some(Upload {
                file_name,
                content_type,
                size: bytes.len(),
            });
        } else {
            let text = field.text().await.map_err(|e| bad_request(&e.to_string()))?;
            fields.insert(name, text);
        }
    }
    Ok((fields, upload))
}

async fn create_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, Rejection> {
    state.log("POST /api/pets".to_string());
    authorize(&headers)?;
    let (fields, upload) = read_multipart(multipart).await?;
    let (name, animal_type, age) = accept_fields(state.behavior(), &fields)?;
    let upload = upload.ok_or_else(|| bad_request("pet_photo is required"))?;

    let mut store = state.store.lock().unwrap();
    let next = format!("pet-{:04}", store.next_id + 1);
    let photo = accept_photo(state.behavior(), &next, &upload)?;
    state.begin_mutation(&mut store);
    let pet = store.insert(OWNER, name, animal_type, age, photo);
    Ok(Json(pet.to_json()).into_response())
}

async fn create_pet_simple(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Response, Rejection> {
    state.log("POST /api/create_pet_simple".to_string());
    if let Some(delay) = state.options.create_delay {
        tokio::time::sleep(delay).await;
    }
    authorize(&headers)?;
    let (name, animal_type, age) = accept_fields(state.behavior(), &fields)?;

    let mut store = state.store.lock().unwrap();
    state.begin_mutation(&mut store);
    let pet = store.insert(OWNER, name, animal_type, age, String::new());
    Ok(Json(pet.to_json()).into_response())
}

async fn update_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Form(fields): Form<HashMap<String, String>>,
) -> Result<Response, Rejection> {
    state.log("PUT /api/pets".to_string());
    authorize(&headers)?;
    let (name, animal_type, age) = accept_fields(state.behavior(), &fields)?;

    let mut store = state.store.lock().unwrap();
    if store.own_mut(&id).is_none() {
        return Err(bad_request("Pet with this id wasn't found"));
    }
    state.begin_mutation(&mut store);
    let pet = store
        .own_mut(&id)
        .map(|pet| {
            pet.name = name;
            pet.animal_type = animal_type;
            pet.age = age;
            pet.clone()
        })
        .ok_or_else(|| bad_request("Pet with this id wasn't found"))?;
    Ok(Json(pet.to_json()).into_response())
}

async fn set_photo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, Rejection> {
    state.log("POST /api/pets/set_photo".to_string());
    authorize(&headers)?;
    let (_, upload) = read_multipart(multipart).await?;
    let upload = upload.ok_or_else(|| bad_request("pet_photo is required"))?;
    let photo = accept_photo(state.behavior(), &id, &upload)?;

    let mut store = state.store.lock().unwrap();
    if store.own_mut(&id).is_none() {
        return Err(bad_request("Pet with this id wasn't found"));
    }
    state.begin_mutation(&mut store);
    let pet = store
        .own_mut(&id)
        .map(|pet| {
            pet.pet_photo = photo;
            pet.clone()
        })
        .ok_or_else(|| bad_request("Pet with this id wasn't found"))?;
    Ok(Json(pet.to_json()).into_response())
}

async fn delete_pet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, Rejection> {
    state.log("DELETE /api/pets".to_string());
    authorize(&headers)?;

    let mut store = state.store.lock().unwrap();
    state.begin_mutation(&mut store);
    store.pets.retain(|p| !(p.id == id && p.owner == OWNER));
    Ok(StatusCode::OK.into_response())
}
