mod common;

use common::{device, FakeDirectory};
use keysync_client::{ClientError, Directory, LoginOutcome, SessionContext, Source};

const PASSPHRASE: &str = "correct-horse-battery";

#[tokio::test]
async fn send_and_fetch_roundtrip_oldest_first() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();

    dev.client.send_message(&ctx, "hello").await.unwrap();
    dev.client.send_message(&ctx, "world").await.unwrap();

    let result = dev.client.fetch_messages(&ctx).await.unwrap();
    assert_eq!(result.source, Source::Network);
    let contents: Vec<_> = result.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "world"]);
    assert!(result.messages.iter().all(|m| m.user_id == ctx.user_id()));

    // The server only ever saw ciphertext.
    let snapshot = dev.client.directory().debug_info().await.unwrap();
    for stored in &snapshot.messages {
        assert_ne!(stored.encrypted_content, "hello");
        assert_ne!(stored.encrypted_content, "world");
    }
}

#[tokio::test]
async fn messages_recovered_on_a_second_device() {
    let directory = FakeDirectory::new();
    let first = device(&directory);
    let ctx = first
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();
    first.client.send_message(&ctx, "hello").await.unwrap();

    let second = device(&directory);
    let pending = match second.client.login("alice").await.unwrap() {
        LoginOutcome::RecoveryRequired(pending) => pending,
        LoginOutcome::Authenticated(_) => panic!("unknown device must not authenticate"),
    };
    let session = second
        .client
        .recover_device(&pending, PASSPHRASE)
        .await
        .unwrap();

    let result = second.client.fetch_messages(&session).await.unwrap();
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].content, "hello");
}

#[tokio::test]
async fn fetch_reconciles_the_local_mirror_to_the_server_set() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();

    let m1 = dev.client.send_message(&ctx, "first").await.unwrap();
    dev.client.send_message(&ctx, "second").await.unwrap();
    dev.client.fetch_messages(&ctx).await.unwrap();

    directory.delete_message(&m1.id);
    dev.client.send_message(&ctx, "third").await.unwrap();
    dev.client.fetch_messages(&ctx).await.unwrap();

    // The mirror now matches the server exactly, deletion included.
    dev.client.set_simulated_offline(true);
    let result = dev.client.fetch_messages(&ctx).await.unwrap();
    assert_eq!(result.source, Source::Cache);
    let contents: Vec<_> = result.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["second", "third"]);
}

#[tokio::test]
async fn outage_serves_the_mirror() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();
    dev.client.send_message(&ctx, "hello").await.unwrap();
    dev.client.fetch_messages(&ctx).await.unwrap();

    directory.set_unreachable(true);
    let result = dev.client.fetch_messages(&ctx).await.unwrap();
    assert_eq!(result.source, Source::Cache);
    assert_eq!(result.messages[0].content, "hello");
}

#[tokio::test]
async fn outage_with_empty_mirror_surfaces_the_outage() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();

    directory.set_unreachable(true);
    let err = dev.client.fetch_messages(&ctx).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Directory(keysync_client::DirectoryError::Unreachable(_))
    ));

    // Explicit offline still answers, with an empty list.
    directory.set_unreachable(false);
    dev.client.set_simulated_offline(true);
    let result = dev.client.fetch_messages(&ctx).await.unwrap();
    assert_eq!(result.source, Source::Cache);
    assert!(result.messages.is_empty());
}

#[tokio::test]
async fn mirror_is_readable_without_the_session_key() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();
    dev.client.send_message(&ctx, "hello").await.unwrap();
    dev.client.fetch_messages(&ctx).await.unwrap();

    // Identity known, key not restored. The mirror still answers.
    let keyless = SessionContext::new(ctx.info().clone());
    let result = dev.client.fetch_messages(&keyless).await.unwrap();
    assert_eq!(result.source, Source::Cache);
    assert_eq!(result.messages[0].content, "hello");
}

#[tokio::test]
async fn missing_key_and_empty_mirror_is_an_error() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();

    let keyless = SessionContext::new(ctx.info().clone());
    let err = dev.client.fetch_messages(&keyless).await.unwrap_err();
    assert!(matches!(err, ClientError::MissingKey));

    let err = dev.client.send_message(&keyless, "hello").await.unwrap_err();
    assert!(matches!(err, ClientError::MissingKey));
}

#[tokio::test]
async fn tampered_message_is_skipped_not_fatal() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();

    let victim = dev.client.send_message(&ctx, "first").await.unwrap();
    dev.client.send_message(&ctx, "second").await.unwrap();
    directory.tamper_message(&victim.id);

    let result = dev.client.fetch_messages(&ctx).await.unwrap();
    assert_eq!(result.source, Source::Network);
    let contents: Vec<_> = result.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["second"]);

    // The tampered record dropped out of the mirror too.
    dev.client.set_simulated_offline(true);
    let result = dev.client.fetch_messages(&ctx).await.unwrap();
    assert_eq!(result.messages.len(), 1);
}

#[tokio::test]
async fn server_rejection_is_not_substituted_by_the_mirror() {
    let directory = FakeDirectory::new();
    let dev = device(&directory);
    let mut ctx = dev
        .client
        .register("alice", PASSPHRASE, PASSPHRASE)
        .await
        .unwrap();
    dev.client.send_message(&ctx, "hello").await.unwrap();
    dev.client.fetch_messages(&ctx).await.unwrap();

    // A second, still-keyed context survives the logout locally.
    let mut keyed = SessionContext::new(ctx.info().clone());
    dev.client
        .restore_session(&mut keyed, keysync_client::RestoreOptions::default())
        .await
        .unwrap();

    // Logging out invalidates the server session; the next fetch is a 401,
    // not an outage, so the mirror must not mask it.
    dev.client.logout(&mut ctx).await.unwrap();
    let err = dev.client.fetch_messages(&keyed).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Directory(keysync_client::DirectoryError::Status { code: 401, .. })
    ));
}
