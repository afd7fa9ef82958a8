//! Mirror generation from authored migrations

use std::fs;
use std::sync::Arc;

use strata_codegen::{ModelSynchronizer, GENERATED_MARKER};
use strata_migrate::{MemoryBackend, MigrationManager, MigrationStore, MirrorSync, PlanOutcome};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    store: MigrationStore,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = MigrationStore::new(dir.path().join("migrations"));
        Self { dir, store }
    }

    fn synchronizer(&self) -> ModelSynchronizer {
        ModelSynchronizer::new(self.dir.path().join("models"), "Model")
    }

    fn model(&self, file: &str) -> String {
        fs::read_to_string(self.dir.path().join("models").join(file)).unwrap()
    }
}

#[test]
fn sync_writes_one_model_per_table() {
    let ws = Workspace::new();
    ws.store
        .create_table("users", &["name:varchar(255)!", "age:integer"])
        .unwrap();
    ws.store.create_table("posts", &["title:text!"]).unwrap();

    let report = ws.synchronizer().sync(&ws.store.list().unwrap()).unwrap();
    assert_eq!(report.tables, vec!["users", "posts"]);
    assert_eq!(report.written.len(), 3);

    let users = ws.model("users.rs");
    assert!(users.contains(GENERATED_MARKER));
    assert!(users.contains(
        "pub struct Users {\n    pub id: i32,\n    pub name: String,\n    pub age: Option<i32>,\n    pub created_at: chrono::NaiveDateTime,\n    pub updated_at: chrono::NaiveDateTime,\n}"
    ));
    assert!(users.contains("const TABLE_NAME: &'static str = \"users\";"));

    let index = ws.model("mod.rs");
    assert!(index.contains("pub trait Model {"));
    assert!(index.contains("pub mod users;\npub use users::Users;"));
    assert!(index.contains("pub mod posts;\npub use posts::Posts;"));
}

#[test]
fn sync_reflects_alterations_and_overwrites() {
    let ws = Workspace::new();
    ws.store
        .create_table("users", &["name:varchar(255)", "age:integer"])
        .unwrap();
    ws.synchronizer().sync(&ws.store.list().unwrap()).unwrap();
    assert!(ws.model("users.rs").contains("pub age: Option<i32>,"));

    ws.store
        .alter_table("users", &["drop", "age", "rename", "name:full_name", "add", "bio:text"])
        .unwrap();
    ws.synchronizer().sync(&ws.store.list().unwrap()).unwrap();

    let users = ws.model("users.rs");
    assert!(!users.contains("pub age"));
    assert!(users.contains("pub full_name: Option<String>,"));
    assert!(users.contains("pub updated_at: chrono::NaiveDateTime,\n    pub bio: Option<String>,\n}"));
}

#[test]
fn mixed_case_names_mirror_the_stored_lower_case() {
    let ws = Workspace::new();
    ws.store.create_table("Users", &["firstName:text"]).unwrap();
    ws.store.alter_table("users", &["add", "lastName:text"]).unwrap();

    let report = ws.synchronizer().sync(&ws.store.list().unwrap()).unwrap();
    assert_eq!(report.tables, vec!["users"]);

    let users = ws.model("users.rs");
    assert!(users.contains("pub firstname: Option<String>,"));
    assert!(users.contains("pub lastname: Option<String>,"));
    assert!(!users.contains("firstName"));
    assert!(!users.contains("rename"));
}

#[test]
fn sync_removes_models_of_vanished_tables_only() {
    let ws = Workspace::new();
    ws.store.create_table("users", &["name"]).unwrap();
    let (posts, posts_path) = ws.store.create_table("posts", &["title"]).unwrap();
    ws.synchronizer().sync(&ws.store.list().unwrap()).unwrap();

    let handwritten = ws.dir.path().join("models").join("helpers.rs");
    fs::write(&handwritten, "pub fn helper() {}\n").unwrap();

    fs::remove_file(posts_path).unwrap();
    assert!(ws.store.get(&posts.name.to_string()).is_err());
    ws.synchronizer().sync(&ws.store.list().unwrap()).unwrap();

    let models = ws.dir.path().join("models");
    assert!(models.join("users.rs").exists());
    assert!(!models.join("posts.rs").exists());
    assert!(handwritten.exists());
    assert!(!ws.model("mod.rs").contains("posts"));
}

#[tokio::test]
async fn manager_syncs_after_a_successful_up() {
    let ws = Workspace::new();
    let backend = MemoryBackend::new();
    let mut manager = MigrationManager::new(ws.store.clone(), Arc::new(backend.clone()))
        .with_mirror(Box::new(ws.synchronizer()));
    ws.store
        .create_table("users", &["name:varchar(255)", "age:integer"])
        .unwrap();

    assert!(matches!(manager.up().await.unwrap(), PlanOutcome::Executed(_)));

    let users = ws.model("users.rs");
    let fields: Vec<&str> = users
        .lines()
        .filter_map(|line| line.trim().strip_prefix("pub "))
        .filter(|line| !line.starts_with("struct"))
        .filter_map(|line| line.split(':').next())
        .collect();
    assert_eq!(fields, vec!["id", "name", "age", "created_at", "updated_at"]);
}
