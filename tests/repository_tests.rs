//! Repository CRUD, tenancy, and soft-delete behavior against SQLite.

mod common;

use common::{rebind, repo, user};
use repokit::error::RepoError;
use repokit::types::{QueryFilter, QueryOptions, SortField};
use serde_json::json;

#[test]
fn create_then_get_roundtrip() {
    let mut repo = repo("acme");
    let created = repo.create(user("John", 30)).unwrap();
    assert!(!created.id.is_empty());
    assert_eq!(created.tenant_id.as_ref().unwrap().as_str(), "acme");

    let fetched = repo.get_by_id(&created.id).unwrap().unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.attr_str("name"), Some("John"));
    assert_eq!(fetched.attr("age"), Some(&json!(30)));
    assert!(!fetched.is_deleted());
}

#[test]
fn duplicate_id_is_rejected() {
    let mut repo = repo("acme");
    let mut data = user("John", 30);
    data.insert("id".to_string(), json!("user-1"));
    repo.create(data.clone()).unwrap();

    let err = repo.create(data).unwrap_err();
    assert!(matches!(err, RepoError::Duplicate { .. }));
}

#[test]
fn tenants_cannot_see_each_other() {
    let mut repo_a = repo("tenant-a");
    let john = repo_a.create(user("John", 30)).unwrap();

    // Same database, different tenant binding.
    let mut repo_b = rebind(repo_a.into_executor(), "tenant-b");
    let jane = repo_b.create(user("Jane", 28)).unwrap();

    assert!(repo_b.get_by_id(&john.id).unwrap().is_none());
    assert_eq!(repo_b.list(&QueryOptions::new()).unwrap().len(), 1);
    assert!(!repo_b.delete(&john.id).unwrap());
    assert!(
        repo_b
            .update(&john.id, user("Hacked", 1))
            .is_err()
    );

    let mut repo_a = rebind(repo_b.into_executor(), "tenant-a");
    let survivor = repo_a.get_by_id(&john.id).unwrap().unwrap();
    assert_eq!(survivor.attr_str("name"), Some("John"));
    assert!(repo_a.get_by_id(&jane.id).unwrap().is_none());
}

#[test]
fn update_applies_partial_data_and_restamps() {
    let mut repo = repo("acme").with_actor("editor");
    let created = repo.create(user("John", 30)).unwrap();

    let mut patch = serde_json::Map::new();
    patch.insert("age".to_string(), json!(31));
    let updated = repo.update(&created.id, patch).unwrap();

    assert_eq!(updated.attr("age"), Some(&json!(31)));
    assert_eq!(updated.attr_str("name"), Some("John"));
    assert_eq!(updated.updated_by.as_deref(), Some("editor"));
    assert!(updated.updated_at >= created.updated_at);
}

#[test]
fn update_missing_entity_is_not_found() {
    let mut repo = repo("acme");
    let err = repo.update("no-such-id", user("X", 1)).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn soft_delete_hides_but_keeps_the_row() {
    let mut repo = repo("acme").with_actor("admin");
    let created = repo.create(user("John", 30)).unwrap();

    assert!(repo.delete(&created.id).unwrap());
    assert!(repo.get_by_id(&created.id).unwrap().is_none());
    assert_eq!(repo.count(&QueryOptions::new()).unwrap(), 0);

    // Deleting again is a no-op.
    assert!(!repo.delete(&created.id).unwrap());

    let everything = repo.list(&QueryOptions::new().include_deleted()).unwrap();
    assert_eq!(everything.len(), 1);
    assert!(everything[0].is_deleted());
    assert_eq!(everything[0].deleted_by.as_deref(), Some("admin"));

    let tombstone = repo
        .get_by_id_include_deleted(&created.id)
        .unwrap()
        .unwrap();
    assert!(tombstone.is_deleted());
}

#[test]
fn hard_delete_removes_soft_deleted_rows() {
    let mut repo = repo("acme");
    let created = repo.create(user("John", 30)).unwrap();
    repo.delete(&created.id).unwrap();

    assert!(repo.hard_delete(&created.id).unwrap());
    assert!(
        repo.list(&QueryOptions::new().include_deleted())
            .unwrap()
            .is_empty()
    );
    assert!(!repo.hard_delete(&created.id).unwrap());
}

#[test]
fn get_by_id_or_raise_reports_entity_and_id() {
    let mut repo = repo("acme");
    match repo.get_by_id_or_raise("ghost").unwrap_err() {
        RepoError::NotFound { entity, id } => {
            assert_eq!(entity, "user");
            assert_eq!(id, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn filters_compose_with_and() {
    let mut repo = repo("acme");
    for (name, age) in [("John", 30), ("Joanna", 45), ("Amy", 30)] {
        repo.create(user(name, age)).unwrap();
    }

    let options = QueryOptions::new()
        .with_filter(QueryFilter::eq("age", 30))
        .with_filter(QueryFilter::like("name", "Jo"));
    let matches = repo.list(&options).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].attr_str("name"), Some("John"));
}

#[test]
fn ilike_matches_case_insensitively() {
    let mut repo = repo("acme");
    for (name, age) in [("John", 30), ("joanna", 45), ("Amy", 30)] {
        repo.create(user(name, age)).unwrap();
    }

    let options = QueryOptions::new()
        .with_filter(QueryFilter::ilike("name", "JO"))
        .with_sort(SortField::asc("name"));
    let matches = repo.list(&options).unwrap();
    let names: Vec<_> = matches.iter().filter_map(|e| e.attr_str("name")).collect();
    assert_eq!(names, vec!["John", "joanna"]);
}

#[test]
fn unknown_filter_field_fails_before_querying() {
    let mut repo = repo("acme");
    let err = repo
        .list(&QueryOptions::new().with_filter(QueryFilter::eq("nme", "x")))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn sort_orders_results() {
    let mut repo = repo("acme");
    for (name, age) in [("John", 30), ("Jane", 25), ("Ann", 40)] {
        repo.create(user(name, age)).unwrap();
    }

    let listed = repo
        .list(&QueryOptions::new().with_sort(SortField::desc("age")))
        .unwrap();
    let ages: Vec<_> = listed.iter().map(|e| e.attr("age").unwrap().clone()).collect();
    assert_eq!(ages, vec![json!(40), json!(30), json!(25)]);
}

#[test]
fn count_matches_list_length() {
    let mut repo = repo("acme");
    for i in 0..7 {
        repo.create(user(&format!("u{i}"), i)).unwrap();
    }
    let options = QueryOptions::new().with_filter(QueryFilter::gte("age", 3));
    assert_eq!(
        repo.count(&options).unwrap(),
        repo.list(&options).unwrap().len() as u64
    );
}
