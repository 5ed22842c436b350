//! Offset and cursor pagination behavior against SQLite.

mod common;

use std::collections::HashSet;

use common::{repo, user};
use repokit::error::{RepoError, ValidationError};
use repokit::types::{
    CursorPaginationParams, PaginationConfig, PaginationParams, QueryOptions, SortField,
};

fn seeded(n: i64) -> repokit::Repository<repokit::backends::sqlite::SqliteExecutor> {
    let mut repo = repo("acme");
    for i in 0..n {
        let mut data = user(&format!("user-{i:04}"), i);
        data.insert("id".to_string(), serde_json::json!(format!("id-{i:04}")));
        repo.create(data).unwrap();
    }
    repo
}

#[test]
fn offset_pages_concatenate_to_the_full_set() {
    let mut repo = seeded(23);
    let options = QueryOptions::new().with_sort(SortField::asc("age"));

    let mut seen = Vec::new();
    for page in 1..=5 {
        let result = repo
            .list_paginated(&options, PaginationParams::new(page, 5))
            .unwrap();
        assert_eq!(result.total, 23);
        assert_eq!(result.pages, 5);
        assert_eq!(result.has_prev, page > 1);
        assert_eq!(result.has_next, page < 5);
        seen.extend(result.items);
    }

    assert_eq!(seen.len(), 23);
    let ages: Vec<i64> = seen.iter().map(|e| e.attr("age").unwrap().as_i64().unwrap()).collect();
    let mut sorted = ages.clone();
    sorted.sort();
    assert_eq!(ages, sorted);

    let full = repo.list(&options).unwrap();
    assert_eq!(full.len(), seen.len());
}

#[test]
fn offset_total_equals_count_under_same_filters() {
    let mut repo = seeded(12);
    let options = QueryOptions::new()
        .with_filter(repokit::types::QueryFilter::gte("age", 4));
    let result = repo
        .list_paginated(&options, PaginationParams::new(1, 3))
        .unwrap();
    assert_eq!(result.total, repo.count(&options).unwrap());
}

#[test]
fn offset_page_past_the_end_is_empty() {
    let mut repo = seeded(4);
    let result = repo
        .list_paginated(&QueryOptions::new(), PaginationParams::new(9, 10))
        .unwrap();
    assert!(result.items.is_empty());
    assert_eq!(result.total, 4);
    assert!(!result.has_next);
    assert!(result.has_prev);
}

#[test]
fn zero_page_size_is_rejected() {
    let mut repo = seeded(1);
    let err = repo
        .list_paginated(&QueryOptions::new(), PaginationParams::new(1, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::InvalidPagination { .. })
    ));
}

#[test]
fn deep_offset_seek_returns_the_same_page() {
    // Threshold low enough that page 3 takes the seek path.
    let mut shallow = seeded(30);
    let options = QueryOptions::new().with_sort(SortField::asc("age"));
    let expected = shallow
        .list_paginated(&options, PaginationParams::new(3, 5))
        .unwrap();

    let mut deep = seeded(30).with_pagination_config(
        PaginationConfig::new().with_deep_page_threshold(10),
    );
    let seeked = deep
        .list_paginated(&options, PaginationParams::new(3, 5))
        .unwrap();

    let ids = |r: &repokit::types::PaginationResult<repokit::Entity>| {
        r.items.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&seeked), ids(&expected));
    assert_eq!(seeked.total, expected.total);
}

#[test]
fn deep_offset_with_tied_sort_keys_matches_the_shallow_page() {
    let build = || {
        let mut repo = repo("acme");
        for i in 0..6 {
            let mut data = user("dup", i);
            let id = format!("id-{}", (b'a' + i as u8) as char);
            data.insert("id".to_string(), serde_json::json!(id));
            repo.create(data).unwrap();
        }
        repo
    };
    let options = QueryOptions::new()
        .with_sort(SortField::asc("name"))
        .with_sort(SortField::desc("age"));

    let mut shallow = build();
    let expected = shallow
        .list_paginated(&options, PaginationParams::new(2, 2))
        .unwrap();

    let mut deep = build().with_pagination_config(
        PaginationConfig::new().with_deep_page_threshold(2),
    );
    let paged = deep
        .list_paginated(&options, PaginationParams::new(2, 2))
        .unwrap();

    let ids = |r: &repokit::types::PaginationResult<repokit::Entity>| {
        r.items.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&paged), ids(&expected));
    // Every name ties, so age DESC decides the order: 5..0, page 2 is 3, 2.
    let ages: Vec<i64> = paged
        .items
        .iter()
        .map(|e| e.attr("age").unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(ages, vec![3, 2]);
}

#[test]
fn list_honors_a_pagination_window_in_the_options() {
    let mut repo = seeded(6);
    let page = |n| {
        QueryOptions::new()
            .with_sort(SortField::asc("age"))
            .with_pagination(PaginationParams::new(n, 2))
    };

    let first = repo.list(&page(1)).unwrap();
    let second = repo.list(&page(2)).unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(first[0].id, "id-0000");
    assert_eq!(second[0].id, "id-0002");
}

#[test]
fn list_honors_a_cursor_window_in_the_options() {
    let mut repo = seeded(6);
    let options = QueryOptions::new()
        .with_cursor(CursorPaginationParams::new(4).with_cursor_field("age"));
    let items = repo.list(&options).unwrap();
    assert_eq!(items.len(), 4);
}

#[test]
fn cursor_traversal_visits_every_row_exactly_once() {
    let mut repo = seeded(17);
    let options = QueryOptions::new();
    let mut params = CursorPaginationParams::new(5).with_cursor_field("age");

    let mut seen = HashSet::new();
    let mut pages = 0;
    loop {
        let page = repo.cursor_paginate(&options, &params).unwrap();
        pages += 1;
        for entity in &page.items {
            assert!(seen.insert(entity.id.clone()), "revisited {}", entity.id);
        }
        match page.next_cursor {
            Some(cursor) if page.has_more => params = params.with_cursor(cursor),
            _ => break,
        }
    }
    assert_eq!(seen.len(), 17);
    assert_eq!(pages, 4);
}

#[test]
fn cursor_traversal_is_stable_under_concurrent_inserts() {
    let mut repo = seeded(10);
    let options = QueryOptions::new();
    let params = CursorPaginationParams::new(4).with_cursor_field("age");

    let first = repo.cursor_paginate(&options, &params).unwrap();
    assert_eq!(first.items.len(), 4);
    assert!(first.has_more);

    // Rows inserted before the cursor position must not shift later pages.
    let mut early = user("late-arrival", -1);
    early.insert("id".to_string(), serde_json::json!("id-before-everything"));
    repo.create(early).unwrap();

    let mut seen: Vec<String> = first.items.iter().map(|e| e.id.clone()).collect();
    let mut params = params.with_cursor(first.next_cursor.unwrap());
    loop {
        let page = repo.cursor_paginate(&options, &params).unwrap();
        seen.extend(page.items.iter().map(|e| e.id.clone()));
        match page.next_cursor {
            Some(cursor) if page.has_more => params = params.with_cursor(cursor),
            _ => break,
        }
    }

    // All ten original rows, each exactly once; the new row sorts before the
    // cursor and is invisible to this traversal.
    assert_eq!(seen.len(), 10);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 10);
    assert!(!seen.contains(&"id-before-everything".to_string()));
}

#[test]
fn cursor_respects_descending_sort() {
    let mut repo = seeded(9);
    let options = QueryOptions::new().with_sort(SortField::desc("age"));
    let mut params = CursorPaginationParams::new(4).with_cursor_field("age");

    let mut ages = Vec::new();
    loop {
        let page = repo.cursor_paginate(&options, &params).unwrap();
        ages.extend(
            page.items
                .iter()
                .map(|e| e.attr("age").unwrap().as_i64().unwrap()),
        );
        match page.next_cursor {
            Some(cursor) if page.has_more => params = params.with_cursor(cursor),
            _ => break,
        }
    }
    assert_eq!(ages, vec![8, 7, 6, 5, 4, 3, 2, 1, 0]);
}

#[test]
fn malformed_cursor_is_rejected() {
    let mut repo = seeded(3);
    let params = CursorPaginationParams::new(5).with_cursor("!!not-a-cursor!!");
    let err = repo.cursor_paginate(&QueryOptions::new(), &params).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::InvalidCursor { .. })
    ));
}

#[test]
fn last_cursor_page_reports_no_more() {
    let mut repo = seeded(5);
    let params = CursorPaginationParams::new(5);
    let page = repo.cursor_paginate(&QueryOptions::new(), &params).unwrap();
    assert_eq!(page.items.len(), 5);
    assert!(!page.has_more);
    assert!(page.next_cursor.is_none());
}
