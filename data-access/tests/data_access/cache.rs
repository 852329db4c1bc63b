use jiff::SignedDuration;
use regex::Regex;
use test_helpers::spawn_app;

#[test]
fn entry_expires_after_ttl_and_is_removed() {
    let app = spawn_app();
    app.cache
        .set_with_ttl("rows", vec![1, 2, 3], SignedDuration::from_millis(100));

    assert_eq!(app.cache.get::<Vec<i32>>("rows"), Some(vec![1, 2, 3]));

    app.time_source.advance(SignedDuration::from_millis(50));
    assert_eq!(app.cache.get::<Vec<i32>>("rows"), Some(vec![1, 2, 3]));

    app.time_source.advance(SignedDuration::from_millis(100));
    assert_eq!(app.cache.len(), 1);
    assert_eq!(app.cache.get::<Vec<i32>>("rows"), None);
    assert_eq!(app.cache.len(), 0);
}

#[test]
fn entry_at_exactly_ttl_is_still_fresh() {
    let app = spawn_app();
    app.cache.set_with_ttl("k", 7u8, SignedDuration::from_secs(1));

    app.time_source.advance(SignedDuration::from_secs(1));
    assert_eq!(app.cache.get::<u8>("k"), Some(7));
}

#[test]
fn default_ttl_is_five_minutes() {
    let app = spawn_app();
    app.cache.set("k", "v".to_string());

    app.time_source.advance(SignedDuration::from_secs(5 * 60));
    assert_eq!(app.cache.get::<String>("k").as_deref(), Some("v"));

    app.time_source.advance(SignedDuration::from_secs(1));
    assert_eq!(app.cache.get::<String>("k"), None);
}

#[test]
fn last_set_wins() {
    let app = spawn_app();
    app.cache.set("k", 1u32);
    app.cache.set("k", 2u32);
    assert_eq!(app.cache.get::<u32>("k"), Some(2));
    assert_eq!(app.cache.len(), 1);
}

#[test]
fn type_mismatch_reads_as_miss() {
    let app = spawn_app();
    app.cache.set("k", 1u32);

    assert_eq!(app.cache.get::<String>("k"), None);
    assert_eq!(app.cache.get::<u32>("k"), Some(1));
}

#[test]
fn invalidate_matching_and_clear() {
    let app = spawn_app();
    app.cache.set(r#"paginated:{"table":"widgets","page":1}"#, 1u32);
    app.cache.set(r#"paginated:{"table":"widgets","page":2}"#, 2u32);
    app.cache.set(r#"paginated:{"table":"units","page":1}"#, 3u32);
    app.cache.set("profile", 4u32);

    let removed =
        app.cache.invalidate_matching(&Regex::new(r#""table":"widgets""#).unwrap());
    assert_eq!(removed, 2);
    assert_eq!(
        app.cache.keys(),
        vec![r#"paginated:{"table":"units","page":1}"#, "profile"]
    );

    app.cache.clear(Some("profile"));
    assert_eq!(app.cache.len(), 1);

    app.cache.invalidate("not-there");
    app.cache.clear(None);
    assert!(app.cache.is_empty());
}
