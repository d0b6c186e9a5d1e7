use keyward::{
    auth::{TokenConfig, TokenIssuer, verify_secret},
    model::{AccountChanges, NewAccount, Role, TraceContext},
    repo::memory::{FailPoint, MemoryStore},
    service::{
        DEFAULT_LIST_LIMIT, ServiceError, TokenExchange, TokenService, UserLifecycle, UserService,
    },
};
use secrecy::SecretString;
use std::sync::Arc;
use uuid::Uuid;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn lifecycle(store: &MemoryStore) -> impl UserService + use<> {
    UserLifecycle::new(
        store.transactor(),
        store.accounts(),
        store.credentials(),
        store.outbox(),
    )
}

fn tokens(store: &MemoryStore) -> Result<impl TokenService + use<>, Box<dyn std::error::Error>> {
    let config = TokenConfig::new(
        SecretString::from("lifecycle-access-key"),
        SecretString::from("lifecycle-refresh-key"),
    );
    let issuer = Arc::new(TokenIssuer::new(&config)?);
    Ok(TokenExchange::new(store.accounts(), store.credentials(), issuer))
}

fn fields(login_id: &str) -> NewAccount {
    NewAccount {
        login_id: login_id.to_string(),
        role: Role::Standard,
        phone: "010-1234-5678".to_string(),
        email: format!("{login_id}@example.com"),
    }
}

#[tokio::test]
async fn create_then_read_back_from_primary_under_replica_lag() -> TestResult {
    let store = MemoryStore::with_replica_lag();
    let users = lifecycle(&store);

    let created = users
        .create_account(fields("alice1234"), "Secret123", &TraceContext::default())
        .await?;

    assert_eq!(
        users.get_account(created.id).await,
        Err(ServiceError::RepoNotFound)
    );
    let fresh = users.get_account_primary(created.id).await?;
    assert_eq!(fresh, created);

    store.sync_replica().await;
    assert_eq!(users.get_account(created.id).await?, created);
    Ok(())
}

#[tokio::test]
async fn account_credential_and_event_share_one_identifier() -> TestResult {
    let store = MemoryStore::new();
    let users = lifecycle(&store);

    let created = users
        .create_account(fields("alice1234"), "Secret123", &TraceContext::default())
        .await?;

    let tables = store.snapshot().await;
    assert_eq!(tables.live_account_ids(), tables.live_credential_ids());
    let credential = &tables.credentials[&created.id];
    assert!(verify_secret(b"Secret123", &credential.password));
    assert!(credential.refresh_token.is_none());

    let [event] = tables.outbox.as_slice() else {
        panic!("expected one outbox event, got {}", tables.outbox.len());
    };
    assert_eq!(event.aggregate_type, "Account");
    assert_eq!(event.aggregate_id, created.id.to_string());
    assert_eq!(event.event_type, "AccountCreated");
    let payload: serde_json::Value = serde_json::from_str(&event.payload)?;
    assert_eq!(payload["loginId"], "alice1234");
    assert_eq!(payload["role"], "standard");
    Ok(())
}

#[tokio::test]
async fn failed_outbox_write_leaves_no_rows() -> TestResult {
    let store = MemoryStore::new();
    let users = lifecycle(&store);
    store.fail_at(FailPoint::OutboxCreate).await;

    let result = users
        .create_account(fields("alice1234"), "Secret123", &TraceContext::default())
        .await;
    assert_eq!(result, Err(ServiceError::RepoServerError));

    let tables = store.snapshot().await;
    assert!(tables.accounts.is_empty());
    assert!(tables.credentials.is_empty());
    assert!(tables.outbox.is_empty());

    store.clear_failures().await;
    users
        .create_account(fields("alice1234"), "Secret123", &TraceContext::default())
        .await?;
    Ok(())
}

#[tokio::test]
async fn deleting_missing_account_writes_nothing() -> TestResult {
    let store = MemoryStore::new();
    let users = lifecycle(&store);

    assert_eq!(
        users
            .delete_account(Uuid::now_v7(), &TraceContext::default())
            .await,
        Err(ServiceError::RepoNotFound)
    );
    assert!(store.snapshot().await.outbox.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleted_login_id_can_sign_up_again() -> TestResult {
    let store = MemoryStore::new();
    let users = lifecycle(&store);
    let trace = TraceContext::default();

    let first = users
        .create_account(fields("alice1234"), "Secret123", &trace)
        .await?;
    assert_eq!(
        users
            .create_account(fields("alice1234"), "Secret123", &trace)
            .await,
        Err(ServiceError::RepoConflict)
    );

    users.delete_account(first.id, &trace).await?;
    let second = users
        .create_account(fields("alice1234"), "Secret123", &trace)
        .await?;
    assert_ne!(first.id, second.id);

    let tables = store.snapshot().await;
    assert_eq!(tables.accounts.len(), 2);
    assert_eq!(tables.live_account_ids().len(), 1);
    let tags: Vec<&str> = tables
        .outbox
        .iter()
        .map(|event| event.event_type.as_str())
        .collect();
    assert_eq!(tags, ["AccountCreated", "AccountDeleted", "AccountCreated"]);
    Ok(())
}

#[tokio::test]
async fn list_window_defaults_and_skips_tombstones() -> TestResult {
    let store = MemoryStore::new();
    let users = lifecycle(&store);
    let trace = TraceContext::default();

    let mut ids = Vec::new();
    for index in 0..3 {
        let account = users
            .create_account(fields(&format!("member{index:04}")), "Secret123", &trace)
            .await?;
        ids.push(account.id);
    }
    users.delete_account(ids[1], &trace).await?;

    let listed = users.list_accounts(0, 0).await?;
    assert!(listed.len() <= usize::try_from(DEFAULT_LIST_LIMIT)?);
    let listed: Vec<Uuid> = listed.iter().map(|account| account.id).collect();
    assert_eq!(listed, [ids[0], ids[2]]);

    let page = users.list_accounts(1, 1).await?;
    assert_eq!(page.iter().map(|account| account.id).collect::<Vec<_>>(), [ids[2]]);
    Ok(())
}

#[tokio::test]
async fn password_change_takes_effect_for_login() -> TestResult {
    let store = MemoryStore::new();
    let users = lifecycle(&store);
    let tokens = tokens(&store)?;

    let account = users
        .create_account(fields("alice1234"), "Secret123", &TraceContext::default())
        .await?;
    tokens.login("alice1234", "Secret123").await?;

    let changes = AccountChanges {
        email: Some("changed@example.com".to_string()),
        ..AccountChanges::default()
    };
    let updated = users.update_account(account.id, changes, "Secret456").await?;
    assert_eq!(updated.email, "changed@example.com");
    assert_eq!(updated.login_id, account.login_id);

    assert_eq!(
        tokens.login("alice1234", "Secret123").await,
        Err(ServiceError::Unauthorized)
    );
    let pair = tokens.login("alice1234", "Secret456").await?;
    assert_eq!(tokens.authenticate(&pair.access.token)?.user_id, account.id);

    assert_eq!(store.snapshot().await.outbox.len(), 1);
    Ok(())
}
