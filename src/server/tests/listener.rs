use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::test_router;
use crate::hub::tests::{seed_proxy, seed_slot};
use crate::modules::persistence::db::temp_store;
use crate::server::HubServer;

#[tokio::test]
async fn socket_address_identifies_clients_without_headers() {
    let (_dir, store) = temp_store();
    seed_slot(&store, "over tcp", 10);
    seed_proxy(&store, "192.168.1.1", 10_011);
    let (app, _) = test_router(&store);

    let cancel = CancellationToken::new();
    let (server, handle) = HubServer::start("127.0.0.1", 0, app, cancel.clone())
        .await
        .expect("bind");
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap();

    let health: serde_json::Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let response = client
        .get(format!("{}/api/allocate-work", base))
        .header("x-instance-number", "4")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let (ip, instance, folder): (String, i64, i64) = store
        .read(|conn| {
            Ok(conn.query_row(
                "SELECT client_ip, instance_number, user_folder FROM work_allocations",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?)
        })
        .unwrap();
    assert_eq!(ip, "127.0.0.1");
    assert_eq!((instance, folder), (4, 1));

    server.stop();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("accept loop stops")
        .unwrap();
}
