use super::*;

async fn store_with_users(ids: &[i64]) -> (Storage, Session) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut session = storage.begin().await.expect("session");
    for id in ids {
        session
            .insert_user(UserId(*id), Rank::User, Step::None)
            .await
            .expect("user");
    }
    (storage, session)
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("meetup_bot_storage_test_{suffix}"));
    let db_path = temp_root.join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn dropped_session_rolls_back() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    {
        let mut session = storage.begin().await.expect("session");
        session
            .insert_user(UserId(1), Rank::User, Step::FirstName)
            .await
            .expect("user");
    }
    let mut session = storage.begin().await.expect("session");
    assert!(session.find_user(UserId(1)).await.expect("find").is_none());
}

#[tokio::test]
async fn committed_session_is_visible_to_the_next_one() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut session = storage.begin().await.expect("session");
    session
        .insert_user(UserId(1), Rank::Admin, Step::FirstName)
        .await
        .expect("user");
    session.commit().await.expect("commit");

    let mut session = storage.begin().await.expect("session");
    let user = session
        .find_user(UserId(1))
        .await
        .expect("find")
        .expect("some user");
    assert_eq!(user.rank, Rank::Admin);
    assert_eq!(user.step, Step::FirstName);
}

#[tokio::test]
async fn profile_save_keeps_rank_and_rating() {
    let (_storage, mut session) = store_with_users(&[1]).await;
    let mut user = session
        .find_user(UserId(1))
        .await
        .expect("find")
        .expect("user");

    session.set_rank(UserId(1), Rank::Organizer).await.expect("rank");
    session.add_rating(UserId(1), 5).await.expect("rating");

    user.first_name = Some("Ada".into());
    user.set_step(Step::MiddleName);
    session.save_user_profile(&user).await.expect("save");

    let stored = session
        .find_user(UserId(1))
        .await
        .expect("find")
        .expect("user");
    assert_eq!(stored.rank, Rank::Organizer);
    assert_eq!(stored.rating, 5);
    assert_eq!(stored.first_name.as_deref(), Some("Ada"));
    assert_eq!(stored.step, Step::MiddleName);
    assert_eq!(stored.previous_step, Step::None);
}

#[tokio::test]
async fn savepoint_rollback_discards_only_inner_writes() {
    let (_storage, mut session) = store_with_users(&[1]).await;
    session.insert_event("kept", UserId(1)).await.expect("event");

    session.savepoint("handler").await.expect("savepoint");
    session
        .insert_catalog(CatalogKind::Interest, "Chess")
        .await
        .expect("catalog");
    session.rollback_to("handler").await.expect("rollback");

    assert!(session
        .list_catalog(CatalogKind::Interest)
        .await
        .expect("list")
        .is_empty());
    assert_eq!(
        session
            .events_for_user(UserId(1), true)
            .await
            .expect("events")
            .len(),
        1
    );
}

#[tokio::test]
async fn new_event_starts_unfinished_with_creator_attending() {
    let (_storage, mut session) = store_with_users(&[1, 2]).await;
    let event = session.insert_event("Meetup", UserId(1)).await.expect("event");

    let stored = session
        .find_event(event)
        .await
        .expect("find")
        .expect("event");
    assert_eq!(stored.status, EventStatus::Unfinished);
    assert_eq!(
        session.attendance(event, UserId(1)).await.expect("attendance"),
        Some(AttendanceStatus::NotArrived)
    );

    let open = session.events_open_to(UserId(2)).await.expect("open");
    assert_eq!(open.len(), 1);
    assert!(session
        .events_open_to(UserId(1))
        .await
        .expect("open")
        .is_empty());
}

#[tokio::test]
async fn finishing_is_one_way() {
    let (_storage, mut session) = store_with_users(&[1]).await;
    let event = session.insert_event("Meetup", UserId(1)).await.expect("event");

    assert!(session.mark_event_finished(event).await.expect("finish"));
    assert!(!session.mark_event_finished(event).await.expect("finish"));
    assert!(session
        .events_for_user(UserId(1), false)
        .await
        .expect("events")
        .is_empty());
}

#[tokio::test]
async fn editor_lock_has_a_single_holder() {
    let (_storage, mut session) = store_with_users(&[1]).await;
    let first = session.insert_event("a", UserId(1)).await.expect("event");
    let second = session.insert_event("b", UserId(1)).await.expect("event");

    assert!(session.insert_editor_lock(UserId(1), first).await.expect("lock"));
    assert!(!session.insert_editor_lock(UserId(1), second).await.expect("lock"));
    assert_eq!(
        session.find_editor_lock(UserId(1)).await.expect("find"),
        Some(first)
    );
    assert!(session.delete_editor_lock(UserId(1)).await.expect("release"));
    assert_eq!(session.find_editor_lock(UserId(1)).await.expect("find"), None);
}

#[tokio::test]
async fn reissued_code_replaces_the_pair_code() {
    let (_storage, mut session) = store_with_users(&[1, 2]).await;
    let event = session.insert_event("Meetup", UserId(1)).await.expect("event");
    session.insert_attendee(event, UserId(2)).await.expect("join");

    session
        .replace_code(event, UserId(2), "AAAA1111")
        .await
        .expect("code");
    session
        .replace_code(event, UserId(2), "BBBB2222")
        .await
        .expect("code");

    assert_eq!(session.active_codes().await.expect("codes"), vec!["BBBB2222"]);
    assert!(!session.code_exists("AAAA1111").await.expect("exists"));
    let code = session
        .find_code("BBBB2222")
        .await
        .expect("find")
        .expect("code");
    assert_eq!(code.user_id, UserId(2));
}

#[tokio::test]
async fn friend_rows_expose_both_directions() {
    let (_storage, mut session) = store_with_users(&[1, 2]).await;
    session
        .insert_friend_edge(UserId(1), UserId(2), FriendStatus::Accepted)
        .await
        .expect("edge");
    session
        .insert_friend_edge(UserId(2), UserId(1), FriendStatus::Waiting)
        .await
        .expect("edge");

    let rows = session.friend_rows(UserId(2)).await.expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].friend.user_id, UserId(1));
    assert_eq!(rows[0].outgoing, FriendStatus::Waiting);
    assert_eq!(rows[0].incoming, Some(FriendStatus::Accepted));
    assert_eq!(
        session
            .count_friend_edges(UserId(2), UserId(1))
            .await
            .expect("count"),
        2
    );
}

#[tokio::test]
async fn second_pending_grant_overwrites_the_first() {
    let (_storage, mut session) = store_with_users(&[1, 2, 3]).await;
    session
        .upsert_pending_grant(UserId(1), UserId(2), GrantKind::Rating)
        .await
        .expect("grant");
    session
        .upsert_pending_grant(UserId(1), UserId(3), GrantKind::Achievement)
        .await
        .expect("grant");

    let grant = session
        .find_pending_grant(UserId(1))
        .await
        .expect("find")
        .expect("grant");
    assert_eq!(grant.recipient_id, UserId(3));
    assert_eq!(grant.kind, GrantKind::Achievement);
}

#[tokio::test]
async fn relation_candidates_split_attached_and_unattached() {
    let (_storage, mut session) = store_with_users(&[1]).await;
    let chess = session
        .insert_catalog(CatalogKind::Interest, "Chess")
        .await
        .expect("chess");
    session
        .insert_catalog(CatalogKind::Interest, "Go")
        .await
        .expect("go");
    session
        .insert_relation(USER_INTERESTS, 1, chess)
        .await
        .expect("attach");

    let attach = session
        .relation_candidates(USER_INTERESTS, 1, RelationOp::Attach)
        .await
        .expect("candidates");
    let detach = session
        .relation_candidates(USER_INTERESTS, 1, RelationOp::Detach)
        .await
        .expect("candidates");
    assert_eq!(attach.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["Go"]);
    assert_eq!(detach.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["Chess"]);
    assert!(session
        .has_relation(USER_INTERESTS, 1, chess)
        .await
        .expect("has"));
}

#[tokio::test]
async fn catalog_names_are_unique_per_table() {
    let (_storage, mut session) = store_with_users(&[]).await;
    session
        .insert_catalog(CatalogKind::Group, "North")
        .await
        .expect("group");
    session
        .insert_catalog(CatalogKind::Interest, "North")
        .await
        .expect("same name in another catalog");
    assert!(session
        .insert_catalog(CatalogKind::Group, "North")
        .await
        .is_err());
}
