//! Account pool scenarios through the public API: selection under churn,
//! cooldown auto-recovery, and picking up a shared-file update.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use relayq::accounts::{Account, AccountPool, AccountStatus, AuthMethod, Credentials, SharedFileSynchronizer};
use relayq::config::SelectionPolicy;
use relayq::secret::SecretString;

fn account(id: &str) -> Account {
    Account::new(
        id.to_string(),
        id.to_string(),
        Credentials {
            refresh_token: SecretString::new("rt".to_string()),
            access_token: None,
            expires_at: None,
            machine_id: None,
            region: None,
            auth_method: AuthMethod::Social,
            client_id: None,
            client_secret: None,
            profile_arn: None,
        },
    )
}

#[tokio::test]
async fn round_robin_survives_an_account_being_disabled_mid_cycle() {
    let pool = Arc::new(AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(50)));
    for id in ["a", "b", "c"] {
        pool.add_account(account(id)).await;
    }

    assert_eq!(pool.select().await.unwrap(), "a");
    pool.disable("b").await.unwrap();
    assert_eq!(pool.select().await.unwrap(), "c");
    assert_eq!(pool.select().await.unwrap(), "a");
    pool.enable("b").await.unwrap();
    assert_eq!(pool.select().await.unwrap(), "b");
}

#[tokio::test]
async fn rate_limited_account_cools_down_then_rejoins_rotation() {
    let pool = Arc::new(AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_millis(30)));
    pool.add_account(account("a")).await;
    pool.add_account(account("b")).await;

    assert_eq!(pool.select().await.unwrap(), "a");
    pool.record_rate_limited("a").await;
    assert_eq!(pool.select().await.unwrap(), "b");
    assert_eq!(pool.select().await.unwrap(), "b");

    tokio::time::sleep(Duration::from_millis(100)).await;
    let choices = [pool.select().await.unwrap(), pool.select().await.unwrap()];
    assert!(choices.contains(&"a".to_string()));
}

#[tokio::test]
async fn shared_file_update_replaces_the_pool_account_set() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"[{{"id": "a", "refreshToken": "rt-a", "status": "active"}}]"#
    )
    .unwrap();

    let pool = Arc::new(AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_secs(60)));
    let synchronizer = SharedFileSynchronizer::new(file.path().to_path_buf());
    synchronizer.sync_if_needed(&pool, true).await.unwrap();
    assert_eq!(pool.select().await.unwrap(), "a");

    // Rewrite with a different account set; "a" should be gone, "b" selectable.
    let mut handle = std::fs::OpenOptions::new().write(true).truncate(true).open(file.path()).unwrap();
    writeln!(
        handle,
        r#"[{{"id": "b", "refreshToken": "rt-b", "status": "active"}}]"#
    )
    .unwrap();
    drop(handle);

    synchronizer.sync_if_needed(&pool, true).await.unwrap();
    assert_eq!(pool.select().await.unwrap(), "b");
    assert_eq!(pool.list().await.len(), 1);
}

#[tokio::test]
async fn cooldown_status_survives_a_shared_file_reload() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"[{{"id": "a", "refreshToken": "rt-a", "status": "active"}}]"#
    )
    .unwrap();

    let pool = Arc::new(AccountPool::new(SelectionPolicy::RoundRobin, Duration::from_secs(60)));
    let synchronizer = SharedFileSynchronizer::new(file.path().to_path_buf());
    synchronizer.sync_if_needed(&pool, true).await.unwrap();
    pool.record_rate_limited("a").await;

    synchronizer.sync_if_needed(&pool, true).await.unwrap();
    let accounts = pool.list().await;
    assert_eq!(accounts[0].status, AccountStatus::Cooldown);
}
