//! End-to-end: run the daemon against unreachable gateways and drive it over IPC.

use std::time::Duration;

use cadence_coordinator::{daemon, CoordinatorConfig};
use cadence_ipc::{IpcClient, IpcError};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

#[derive(Deserialize)]
struct HealthReply {
    status: String,
    schedules_registered: usize,
}

fn b58(byte: u8) -> String {
    bs58::encode([byte; 32]).into_string()
}

#[tokio::test]
async fn test_register_and_query_over_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("coordinator.sock");
    let config = CoordinatorConfig {
        ledger_rpc_url: "http://127.0.0.1:9".to_string(),
        rollup_rpc_url: "http://127.0.0.1:9".to_string(),
        database_path: Some(dir.path().join("cadence.db")),
        socket_path: Some(socket.clone()),
        request_timeout_ms: 200,
        ..Default::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let daemon = tokio::spawn(daemon::run(config, shutdown_rx));

    let client = IpcClient::new(&socket);
    for _ in 0..100 {
        if client.is_daemon_running().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let status = client.send_request("status", None).await.unwrap();
    assert_eq!(status["status"], "running");

    let registered = client
        .send_request(
            "schedules.register",
            Some(json!({
                "schedule": b58(1),
                "schedule_id": vec![2u8; 32],
                "vault_employer": b58(3),
                "token_mint": b58(4),
                "recipients": [
                    { "address": b58(10), "amount": "100000" },
                    { "address": b58(11), "amount": "200000" },
                    { "address": b58(12), "amount": "300000" },
                ],
            })),
        )
        .await
        .unwrap();
    assert_eq!(registered["recipient_count"], 3);

    let summary = client
        .send_request("schedules.get", Some(json!({ "schedule": b58(1) })))
        .await
        .unwrap();
    assert_eq!(summary["merkle_root"], registered["merkle_root"]);

    let missing = client
        .send_request("schedules.get", Some(json!({ "schedule": b58(7) })))
        .await
        .unwrap_err();
    assert!(matches!(missing, IpcError::DaemonError { code: -32004, .. }));

    let health: HealthReply = client.call("health", None).await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.schedules_registered, 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_invalid_config_refuses_to_start() {
    let config = CoordinatorConfig { authority: "short".to_string(), ..Default::default() };
    let (_tx, rx) = watch::channel(false);
    assert!(daemon::run(config, rx).await.is_err());
}

#[tokio::test]
async fn test_unbindable_socket_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let config = CoordinatorConfig {
        ledger_rpc_url: "http://127.0.0.1:9".to_string(),
        rollup_rpc_url: "http://127.0.0.1:9".to_string(),
        socket_path: Some(dir.path().join("missing-dir").join("coordinator.sock")),
        request_timeout_ms: 200,
        ..Default::default()
    };
    let (_tx, rx) = watch::channel(false);

    let result = tokio::time::timeout(Duration::from_secs(3), daemon::run(config, rx))
        .await
        .expect("daemon kept running after bind failure");
    assert!(matches!(result, Err(cadence_coordinator::CoordinatorError::Ipc(_))));
}
